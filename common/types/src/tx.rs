use std::fmt::{Display, Formatter};

use rlp::{Rlp, RlpStream};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::utxo::{Utxo, UtxoKey};
use crate::{Address, BlockNumber, Signature, TxHash};

const SIGNED_FIELD_COUNT: usize = 14;
const UNSIGNED_FIELD_COUNT: usize = 12;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxType {
    Normal,
    Deposit,
    Withdraw,
    Merge,
}

impl TxType {
    pub fn tag(&self) -> u8 {
        match self {
            TxType::Normal => 1,
            TxType::Deposit => 2,
            TxType::Withdraw => 3,
            TxType::Merge => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(TxType::Normal),
            2 => Some(TxType::Deposit),
            3 => Some(TxType::Withdraw),
            4 => Some(TxType::Merge),
            _ => None,
        }
    }
}

impl Display for TxType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TxType::Normal => "NORMAL",
            TxType::Deposit => "DEPOSIT",
            TxType::Withdraw => "WITHDRAW",
            TxType::Merge => "MERGE",
        };
        f.write_str(name)
    }
}

/// Reference to a spent output. Block number zero marks an absent input.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TxInput {
    pub blk_num: BlockNumber,
    pub tx_index: u32,
    pub o_index: u8,
    pub signature: Signature,
}

impl TxInput {
    pub fn new(key: UtxoKey) -> Self {
        Self {
            blk_num: key.blk_num,
            tx_index: key.tx_index,
            o_index: key.o_index,
            signature: Signature::zero(),
        }
    }

    pub fn key(&self) -> UtxoKey {
        UtxoKey::new(self.blk_num, self.tx_index, self.o_index)
    }

    pub fn is_empty(&self) -> bool {
        self.blk_num == 0
    }
}

/// Zero owner or zero denomination marks an absent output.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TxOutput {
    pub owner: Address,
    pub denom: u64,
}

impl TxOutput {
    pub fn new(owner: Address, denom: u64) -> Self {
        Self { owner, denom }
    }

    pub fn is_empty(&self) -> bool {
        self.denom == 0 || self.owner.is_zero()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Transaction {
    pub inputs: [TxInput; 2],
    pub outputs: [TxOutput; 2],
    pub fee: u64,
    pub tx_type: TxType,
}

impl Transaction {
    pub fn new(inputs: &[UtxoKey], outputs: &[TxOutput], fee: u64) -> Result<Self, CodecError> {
        if inputs.is_empty() || inputs.len() > 2 {
            return Err(CodecError::MalformedTransaction(format!(
                "expected 1 or 2 inputs, got {}",
                inputs.len()
            )));
        }
        if outputs.len() > 2 {
            return Err(CodecError::MalformedTransaction(format!(
                "expected at most 2 outputs, got {}",
                outputs.len()
            )));
        }
        let mut tx = Transaction::empty(TxType::Normal);
        for (slot, key) in inputs.iter().enumerate() {
            tx.inputs[slot] = TxInput::new(*key);
        }
        for (slot, output) in outputs.iter().enumerate() {
            tx.outputs[slot] = *output;
        }
        tx.fee = fee;
        Ok(tx)
    }

    pub fn deposit(owner: Address, amount: u64) -> Self {
        let mut tx = Transaction::empty(TxType::Deposit);
        tx.outputs[0] = TxOutput::new(owner, amount);
        tx
    }

    pub fn withdrawal(key: UtxoKey) -> Self {
        let mut tx = Transaction::empty(TxType::Withdraw);
        tx.inputs[0] = TxInput::new(key);
        tx
    }

    /// Combines two outputs of the same owner into one.
    pub fn merge(first: &Utxo, second: &Utxo) -> Self {
        let mut tx = Transaction::empty(TxType::Merge);
        tx.inputs[0] = TxInput::new(first.key);
        tx.inputs[1] = TxInput::new(second.key);
        tx.outputs[0] = TxOutput::new(first.owner, first.denom.saturating_add(second.denom));
        tx
    }

    fn empty(tx_type: TxType) -> Self {
        Self {
            inputs: [TxInput::default(); 2],
            outputs: [TxOutput::default(); 2],
            fee: 0,
            tx_type,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.tx_type == TxType::Normal
    }

    pub fn is_deposit(&self) -> bool {
        self.tx_type == TxType::Deposit && self.inputs.iter().all(TxInput::is_empty)
    }

    pub fn is_withdrawal(&self) -> bool {
        self.tx_type == TxType::Withdraw && self.outputs.iter().all(TxOutput::is_empty)
    }

    pub fn is_merge(&self) -> bool {
        self.tx_type == TxType::Merge && self.fee == 0
    }

    pub fn present_inputs(&self) -> impl Iterator<Item = &TxInput> {
        self.inputs.iter().filter(|input| !input.is_empty())
    }

    /// Present outputs with their output index.
    pub fn present_outputs(&self) -> impl Iterator<Item = (u8, &TxOutput)> {
        self.outputs
            .iter()
            .enumerate()
            .filter(|(_, output)| !output.is_empty())
            .map(|(index, output)| (index as u8, output))
    }

    pub fn output_sum(&self) -> u128 {
        self.present_outputs()
            .map(|(_, output)| output.denom as u128)
            .sum()
    }

    pub fn set_signature(&mut self, slot: usize, signature: Signature) {
        if let Some(input) = self.inputs.get_mut(slot) {
            input.signature = signature
        }
    }

    /// Canonical RLP list. Without signatures this is the message each
    /// input owner signs.
    pub fn encode(&self, include_signatures: bool) -> Vec<u8> {
        let fields = if include_signatures {
            SIGNED_FIELD_COUNT
        } else {
            UNSIGNED_FIELD_COUNT
        };
        let mut stream = RlpStream::new_list(fields);
        for input in self.inputs.iter() {
            stream.append(&input.blk_num);
            stream.append(&input.tx_index);
            stream.append(&input.o_index);
            if include_signatures {
                stream.append(&input.signature.as_bytes().to_vec());
            }
        }
        for output in self.outputs.iter() {
            stream.append(&output.owner);
            stream.append(&output.denom);
        }
        stream.append(&self.fee);
        stream.append(&self.tx_type.tag());
        stream.out().to_vec()
    }

    pub fn signed_bytes(&self) -> Vec<u8> {
        self.encode(true)
    }

    pub fn sig_message(&self) -> Vec<u8> {
        self.encode(false)
    }

    pub fn hash(&self) -> TxHash {
        crypto::keccak256(self.encode(true))
    }

    /// Strict inverse of `encode(true)`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let rlp = Rlp::new(bytes);
        let info = rlp.payload_info()?;
        if info.total() != bytes.len() {
            return Err(CodecError::MalformedTransaction(
                "trailing bytes after transaction".to_string(),
            ));
        }
        if !rlp.is_list() {
            return Err(CodecError::MalformedTransaction("expected a list".to_string()));
        }
        let count = rlp.item_count()?;
        if count != SIGNED_FIELD_COUNT {
            return Err(CodecError::MalformedTransaction(format!(
                "expected {} fields, got {}",
                SIGNED_FIELD_COUNT, count
            )));
        }

        let mut inputs = [TxInput::default(); 2];
        for (slot, input) in inputs.iter_mut().enumerate() {
            let base = slot * 4;
            let raw_sig: Vec<u8> = rlp.val_at(base + 3)?;
            *input = TxInput {
                blk_num: rlp.val_at(base)?,
                tx_index: rlp.val_at(base + 1)?,
                o_index: rlp.val_at(base + 2)?,
                signature: Signature::from_slice(&raw_sig).ok_or_else(|| {
                    CodecError::MalformedTransaction(format!(
                        "signature must be 65 bytes, got {}",
                        raw_sig.len()
                    ))
                })?,
            };
            if input.o_index > 1 {
                return Err(CodecError::MalformedTransaction(format!(
                    "output index {} out of range",
                    input.o_index
                )));
            }
        }

        let mut outputs = [TxOutput::default(); 2];
        for (slot, output) in outputs.iter_mut().enumerate() {
            let base = 8 + slot * 2;
            *output = TxOutput {
                owner: rlp.val_at(base)?,
                denom: rlp.val_at(base + 1)?,
            };
        }

        let fee: u64 = rlp.val_at(12)?;
        let tag: u8 = rlp.val_at(13)?;
        let tx_type = TxType::from_tag(tag).ok_or_else(|| {
            CodecError::MalformedTransaction(format!("unknown transaction type {}", tag))
        })?;

        Ok(Transaction {
            inputs,
            outputs,
            fee,
            tx_type,
        })
    }
}
