use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::{
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
    Status,
};

/// Codec of one method whose schema is known only at runtime.
/// Requests are already built messages; responses are decoded against the method's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCodec {
    method: MethodDescriptor,
}
impl MethodCodec {
    pub fn new(method: MethodDescriptor) -> Self {
        Self { method }
    }
}

impl Codec for MethodCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = MethodEncoder;
    type Decoder = MethodDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        MethodEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        MethodDecoder(self.method.output())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MethodEncoder;
impl Encoder for MethodEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MethodDecoder(MessageDescriptor);
impl Decoder for MethodDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    // an empty frame is a valid message with every field at its default
    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let Self(descriptor) = self;
        let dynamic_message = DynamicMessage::decode(descriptor.clone(), src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Some(dynamic_message))
    }
}
