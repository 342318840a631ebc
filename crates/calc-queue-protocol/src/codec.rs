use crate::{Message, MessageType, ProtocolError, Result, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for encoding/decoding messages with length-prefixed framing
///
/// Frame format: [4-byte length (big-endian)] [1-byte message type] [payload]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Need at least 5 bytes for length prefix + message type
        if src.len() < 5 {
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[0..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }
        if length == 0 {
            return Err(ProtocolError::Protocol("empty frame".to_string()));
        }

        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);

        let msg_type_byte = src.get_u8();
        let msg_type = MessageType::from_u8(msg_type_byte)
            .ok_or(ProtocolError::InvalidMessageType(msg_type_byte))?;

        let payload = src.split_to(length - 1);

        let message = match msg_type {
            MessageType::SubmitTask => Message::SubmitTask(bincode::deserialize(&payload)?),
            MessageType::ClaimTask => Message::ClaimTask(bincode::deserialize(&payload)?),
            MessageType::TaskResult => Message::TaskResult(bincode::deserialize(&payload)?),
            MessageType::Ack => Message::Ack(bincode::deserialize(&payload)?),
            MessageType::Nack => Message::Nack(bincode::deserialize(&payload)?),
            MessageType::QueryStatus => Message::QueryStatus(bincode::deserialize(&payload)?),
        };

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = match &item {
            Message::SubmitTask(req) => bincode::serialize(req)?,
            Message::ClaimTask(req) => bincode::serialize(req)?,
            Message::TaskResult(req) => bincode::serialize(req)?,
            Message::Ack(resp) => bincode::serialize(resp)?,
            Message::Nack(resp) => bincode::serialize(resp)?,
            Message::QueryStatus(req) => bincode::serialize(req)?,
        };

        let total_length = 1 + payload.len();
        if total_length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(total_length));
        }

        dst.reserve(4 + total_length);
        dst.put_u32(total_length as u32);
        dst.put_u8(item.message_type().as_u8());
        dst.put_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SubmitTaskRequest, TaskResultRequest};
    use calc_queue_core::{ErrorDetail, JobArgs, OpKind, TaskHandle, TaskKind};

    #[test]
    fn test_submit_message_survives_framing() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let handle = TaskHandle::new(TaskKind::Parallel);
        let message = Message::SubmitTask(SubmitTaskRequest {
            handle,
            args: JobArgs::new(2, 5.0, 0.0),
        });

        codec.encode(message, &mut buffer).unwrap();

        match codec.decode(&mut buffer).unwrap() {
            Some(Message::SubmitTask(req)) => {
                assert_eq!(req.handle, handle);
                assert_eq!(req.args, JobArgs::new(2, 5.0, 0.0));
            }
            other => panic!("Wrong message: {:?}", other),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_failure_outcome_survives_framing() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let detail = ErrorDetail::new("DivisionByZero", "div: division by zero")
            .with_operation(OpKind::Div);
        let message = Message::TaskResult(TaskResultRequest {
            task_id: uuid::Uuid::new_v4(),
            worker_id: "worker-1".to_string(),
            outcome: Err(detail.clone()),
        });

        codec.encode(message, &mut buffer).unwrap();

        match codec.decode(&mut buffer).unwrap() {
            Some(Message::TaskResult(req)) => assert_eq!(req.outcome, Err(detail)),
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_partial_message() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        codec
            .encode(Message::ack_with_message("No tasks available"), &mut buffer)
            .unwrap();

        let full_len = buffer.len();
        let partial = buffer.split_to(full_len / 2);
        let mut partial_buffer = BytesMut::from(&partial[..]);

        assert!(codec.decode(&mut partial_buffer).unwrap().is_none());
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();
        buffer.put_u32((MAX_MESSAGE_SIZE + 1) as u32);
        buffer.put_u8(MessageType::Ack.as_u8());

        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::MessageTooLarge(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_message_type() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();
        buffer.put_u32(1);
        buffer.put_u8(42);

        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::InvalidMessageType(42))
        ));
    }
}
