//! EtherNet/IP framing: encapsulation header and Common Packet Format

pub mod cpf;
pub mod encapsulation;

pub use cpf::{item_type, CommonPacket, CpfItem};
pub use encapsulation::{command, EncapsulationCodec, EncapsulationPacket};
