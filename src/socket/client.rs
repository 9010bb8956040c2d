//! Blocking TCP client for one external orchestrator.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use crate::error::SocketError;
use crate::socket::codec::{self, Message};
use crate::socket::descriptor::SocketDescriptor;

/// An open connection to the orchestrator.
#[derive(Debug)]
pub struct SocketClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl SocketClient {
    /// Opens a connection to the address in `descriptor`.
    ///
    /// # Errors
    ///
    /// [`SocketError::Connect`] if the peer cannot be reached.
    pub fn connect(descriptor: &SocketDescriptor) -> Result<Self, SocketError> {
        let addr = descriptor.address();
        let stream = TcpStream::connect(&addr).map_err(|source| SocketError::Connect {
            addr: addr.clone(),
            source,
        })?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        log::info!("connected to external interface at {addr}");
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Sends `time` and `values`, then blocks for the peer's reply.
    ///
    /// # Errors
    ///
    /// Any transport failure, a closed connection, or a malformed reply.
    pub fn exchange(&mut self, time: f64, values: &[f64]) -> Result<Message, SocketError> {
        self.send(&Message::data(time, values.to_vec()))?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(SocketError::Closed);
        }
        codec::decode(&line)
    }

    /// Sends a control message carrying only `flag`.
    pub fn send_flag(&mut self, flag: i32) -> Result<(), SocketError> {
        self.send(&Message::control(flag))
    }

    fn send(&mut self, msg: &Message) -> Result<(), SocketError> {
        self.writer.write_all(codec::encode(msg).as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}
