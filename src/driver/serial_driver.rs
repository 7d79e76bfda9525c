use super::CommandSink;
use crate::control::{Axis, AxisCommand};
use anyhow::Error;
use anyhow::Result;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures::SinkExt;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Encoder};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum SerialDriverError {
    #[error("communication with motor controller failed")]
    CommError,
    #[error("failed opening serial port")]
    FailedOpeningSerialPort,
}

/// One axis command as the motor controller firmware expects it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireAxisCommand {
    pub axis: Axis,
    pub magnitude: f32,
}

impl From<AxisCommand> for WireAxisCommand {
    fn from(command: AxisCommand) -> Self {
        Self {
            axis: command.axis(),
            magnitude: command.magnitude(),
        }
    }
}

impl WireAxisCommand {
    /// `[axis, f32 le]` COBS encoded and zero terminated
    fn encode(&self) -> Vec<u8> {
        let axis = match self.axis {
            Axis::Forward => 0_u8,
            Axis::Rotate => 1_u8,
        };
        let mut buffer = Vec::with_capacity(5);
        buffer.push(axis);
        buffer.extend_from_slice(&self.magnitude.to_le_bytes());

        let mut encoded = postcard_cobs::encode_vec(&buffer);
        encoded.push(0);
        encoded
    }
}

pub struct TurtleProtocol;

impl Decoder for TurtleProtocol {
    type Item = ();
    type Error = Error;

    fn decode(&mut self, _: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(None)
    }
}

impl Encoder<WireAxisCommand> for TurtleProtocol {
    type Error = Error;

    fn encode(&mut self, data: WireAxisCommand, buf: &mut BytesMut) -> Result<(), Error> {
        let encoded_data = data.encode();
        buf.reserve(encoded_data.len());
        buf.put_slice(&encoded_data);
        Ok(())
    }
}

/// Drives the turtle base directly over a serial link
pub struct SerialCommandSink {
    framed_port: tokio_util::codec::Framed<tokio_serial::SerialStream, TurtleProtocol>,
}

impl SerialCommandSink {
    pub fn new(port: &str, baud_rate: u32) -> Result<Self> {
        let serial_port = tokio_serial::new(port, baud_rate)
            .open_native_async()
            .map_err(|_| SerialDriverError::FailedOpeningSerialPort)?;
        Ok(Self {
            framed_port: TurtleProtocol.framed(serial_port),
        })
    }
}

#[async_trait]
impl CommandSink for SerialCommandSink {
    async fn send(&mut self, command: AxisCommand) -> Result<()> {
        self.framed_port
            .send(WireAxisCommand::from(command))
            .await
            .map_err(|_| SerialDriverError::CommError)?;
        Ok(())
    }
}
