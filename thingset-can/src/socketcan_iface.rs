/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! [`transport::CanInterface`] over a real Linux SocketCAN device, behind the `socketcan`
//! feature. Classic (non-FD) frames only, matching the rest of this crate.

use std::time::Duration;

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};
use thingset_error::TransportError;

use crate::can_id::CanId;
use crate::transport::CanInterface;

pub struct SocketCanInterface {
    socket: CanSocket,
}

impl SocketCanInterface {
    /// Opens `interface` (e.g. `"can0"`) in non-blocking-with-timeout mode.
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        let socket = CanSocket::open(interface).map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(SocketCanInterface { socket })
    }
}

impl CanInterface for SocketCanInterface {
    fn send(&mut self, id: CanId, data: &[u8]) -> Result<(), TransportError> {
        let ext_id = ExtendedId::new(id.raw()).ok_or_else(|| TransportError::Io("CAN ID exceeds 29 bits".into()))?;
        let frame = CanFrame::new(ext_id, data).ok_or_else(|| TransportError::Io("CAN payload exceeds 8 bytes".into()))?;
        self.socket.write_frame(&frame).map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(CanId, Vec<u8>)>, TransportError> {
        match self.socket.read_frame_timeout(timeout) {
            Ok(CanFrame::Data(frame)) => {
                let id = match frame.id() {
                    socketcan::Id::Extended(ext) => CanId::from_raw(ext.as_raw()),
                    socketcan::Id::Standard(std_id) => CanId::from_raw(std_id.as_raw() as u32),
                };
                Ok(Some((id, frame.data().to_vec())))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }
}
