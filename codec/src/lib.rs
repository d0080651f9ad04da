use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait Encoder: Sized + Serialize + DeserializeOwned {
    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| e.into())
    }
}

pub trait Decoder: Sized + Serialize + DeserializeOwned {
    fn decode(buf: &[u8]) -> Result<Self> {
        bincode::deserialize(buf).map_err(|e| e.into())
    }
}

#[macro_export]
macro_rules! impl_codec {
    ($type : ty) => {
        impl Encoder for $type {}
        impl Decoder for $type {}
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Envelope {
        kind: u8,
        data: Vec<u8>,
    }

    impl_codec!(Envelope);

    #[test]
    fn test_struct_codec() {
        let msg = Envelope {
            kind: 2,
            data: vec![0xde, 0xad],
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(Envelope::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let msg = Envelope {
            kind: 1,
            data: vec![1, 2, 3, 4],
        };
        let encoded = msg.encode().unwrap();
        assert!(Envelope::decode(&encoded[..encoded.len() - 1]).is_err());
    }
}
