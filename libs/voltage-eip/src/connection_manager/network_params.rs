//! Forward Open connection parameters
//!
//! Network connection parameters are kept as a structured record and only
//! packed into the CIP bitfield when a request is encoded.
//!
//! ```text
//! Forward Open (16 bit):       owner[15] type[14:13] priority[11:10] var[9] size[8:0]
//! Large Forward Open (32 bit): owner[31] type[30:29] priority[27:26] var[25] size[15:0]
//! ```

use serde::{Deserialize, Serialize};

use crate::cip::EPath;
use crate::constants::{
    DEFAULT_PRIORITY_TIME_TICK, DEFAULT_TIMEOUT_TICKS, MAX_FORWARD_OPEN_SIZE,
    MAX_TIMEOUT_MULTIPLIER, RUN_IDLE_HEADER_LEN, SEQUENCE_COUNT_LEN,
};
use crate::error::{EipError, Result};

/// Connection ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    #[default]
    Exclusive,
    Redundant,
}

/// Connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// No data in this direction
    Null,
    Multicast,
    #[default]
    PointToPoint,
}

impl ConnectionType {
    fn bits(self) -> u32 {
        match self {
            ConnectionType::Null => 0,
            ConnectionType::Multicast => 1,
            ConnectionType::PointToPoint => 2,
        }
    }
}

/// Connection priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    High,
    #[default]
    Scheduled,
    Urgent,
}

impl Priority {
    fn bits(self) -> u32 {
        match self {
            Priority::Low => 0,
            Priority::High => 1,
            Priority::Scheduled => 2,
            Priority::Urgent => 3,
        }
    }
}

/// Fixed or variable connection size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeType {
    #[default]
    Fixed,
    Variable,
}

/// Network connection parameters for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConnectionParams {
    pub owner: Ownership,
    pub connection_type: ConnectionType,
    pub priority: Priority,
    pub size_type: SizeType,
    /// Application payload size in bytes, without sequence count or header
    pub size: u16,
}

impl NetworkConnectionParams {
    /// Point-to-point, scheduled, fixed size
    pub fn point_to_point(size: u16) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Multicast, scheduled, fixed size
    pub fn multicast(size: u16) -> Self {
        Self {
            connection_type: ConnectionType::Multicast,
            size,
            ..Self::default()
        }
    }

    /// Direction that carries no data (e.g. listen-only heartbeat)
    pub fn null() -> Self {
        Self {
            connection_type: ConnectionType::Null,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_size_type(mut self, size_type: SizeType) -> Self {
        self.size_type = size_type;
        self
    }

    pub fn is_null(&self) -> bool {
        self.connection_type == ConnectionType::Null
    }

    pub fn is_variable(&self) -> bool {
        self.size_type == SizeType::Variable
    }

    fn flag_bits(&self) -> u32 {
        let owner = match self.owner {
            Ownership::Exclusive => 0,
            Ownership::Redundant => 1,
        };
        let variable = match self.size_type {
            SizeType::Fixed => 0,
            SizeType::Variable => 1,
        };
        // laid out for the 32-bit form; the 16-bit form shifts right by 16
        (owner << 31)
            | (self.connection_type.bits() << 29)
            | (self.priority.bits() << 26)
            | (variable << 25)
    }

    /// Pack for Forward Open with the given on-wire connection size
    pub fn to_u16(&self, wire_size: u16) -> Result<u16> {
        if wire_size > MAX_FORWARD_OPEN_SIZE {
            return Err(EipError::validation(format!(
                "Connection size {wire_size} exceeds {MAX_FORWARD_OPEN_SIZE}, use Large Forward Open"
            )));
        }
        Ok(((self.flag_bits() >> 16) as u16) | wire_size)
    }

    /// Pack for Large Forward Open with the given on-wire connection size
    pub fn to_u32(&self, wire_size: u16) -> u32 {
        self.flag_bits() | u32::from(wire_size)
    }
}

/// Transport class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportClass {
    Class0,
    #[default]
    Class1,
    Class2,
    Class3,
}

impl TransportClass {
    fn bits(self) -> u8 {
        match self {
            TransportClass::Class0 => 0,
            TransportClass::Class1 => 1,
            TransportClass::Class2 => 2,
            TransportClass::Class3 => 3,
        }
    }

    /// Classes 1-3 prefix connected data with a 16-bit sequence count
    pub fn has_sequence_count(self) -> bool {
        !matches!(self, TransportClass::Class0)
    }
}

/// Production trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionTrigger {
    #[default]
    Cyclic,
    ChangeOfState,
    Application,
}

impl ProductionTrigger {
    fn bits(self) -> u8 {
        match self {
            ProductionTrigger::Cyclic => 0,
            ProductionTrigger::ChangeOfState => 1,
            ProductionTrigger::Application => 2,
        }
    }
}

/// Transport direction bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportDirection {
    #[default]
    Client,
    Server,
}

/// Transport class and trigger byte: `dir[7] trigger[6:4] class[3:0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportTypeTrigger {
    pub class: TransportClass,
    pub trigger: ProductionTrigger,
    pub direction: TransportDirection,
}

impl TransportTypeTrigger {
    pub fn new(class: TransportClass, trigger: ProductionTrigger) -> Self {
        Self {
            class,
            trigger,
            direction: TransportDirection::Client,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let direction = match self.direction {
            TransportDirection::Client => 0,
            TransportDirection::Server => 0x80,
        };
        direction | (self.trigger.bits() << 4) | self.class.bits()
    }
}

/// Everything needed to open one implicit connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParameters {
    /// Target application path, e.g. config / output / input assemblies
    pub connection_path: EPath,
    pub originator_vendor_id: u16,
    pub originator_serial_number: u32,
    pub o2t_network_params: NetworkConnectionParams,
    pub t2o_network_params: NetworkConnectionParams,
    /// Requested packet interval, microseconds
    pub o2t_rpi: u32,
    /// Requested packet interval, microseconds
    pub t2o_rpi: u32,
    pub transport_type_trigger: TransportTypeTrigger,
    /// O→T data carries the 32-bit run/idle header
    pub o2t_real_time_format: bool,
    /// T→O data carries the 32-bit run/idle header
    pub t2o_real_time_format: bool,
    pub priority_time_tick: u8,
    pub timeout_ticks: u8,
    /// Inactivity timeout is `RPI * (4 << multiplier)`
    pub connection_timeout_multiplier: u8,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            connection_path: EPath::empty(),
            originator_vendor_id: 0,
            originator_serial_number: 0,
            o2t_network_params: NetworkConnectionParams::default(),
            t2o_network_params: NetworkConnectionParams::default(),
            o2t_rpi: 10_000,
            t2o_rpi: 10_000,
            transport_type_trigger: TransportTypeTrigger::default(),
            o2t_real_time_format: true,
            t2o_real_time_format: false,
            priority_time_tick: DEFAULT_PRIORITY_TIME_TICK,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            connection_timeout_multiplier: 1,
        }
    }
}

impl ConnectionParameters {
    /// On-wire O→T connection size
    pub fn o2t_wire_size(&self) -> Result<u16> {
        wire_size(
            &self.o2t_network_params,
            self.transport_type_trigger.class,
            self.o2t_real_time_format,
        )
    }

    /// On-wire T→O connection size
    pub fn t2o_wire_size(&self) -> Result<u16> {
        wire_size(
            &self.t2o_network_params,
            self.transport_type_trigger.class,
            self.t2o_real_time_format,
        )
    }

    /// Check the parameters before anything is sent
    pub fn validate(&self) -> Result<()> {
        if self.connection_path.is_empty() {
            return Err(EipError::validation("Connection path is empty"));
        }
        if self.connection_timeout_multiplier > MAX_TIMEOUT_MULTIPLIER {
            return Err(EipError::validation(format!(
                "Connection timeout multiplier {} exceeds {}",
                self.connection_timeout_multiplier, MAX_TIMEOUT_MULTIPLIER
            )));
        }
        if self.o2t_network_params.is_null() && self.t2o_network_params.is_null() {
            return Err(EipError::validation(
                "Both directions use the null connection type",
            ));
        }
        self.o2t_wire_size()?;
        self.t2o_wire_size()?;
        Ok(())
    }
}

/// Payload plus sequence count (class 1-3) plus run/idle header (real-time
/// format); zero for a null direction
fn wire_size(
    params: &NetworkConnectionParams,
    class: TransportClass,
    real_time_format: bool,
) -> Result<u16> {
    if params.is_null() {
        return Ok(0);
    }

    let mut size = usize::from(params.size);
    if class.has_sequence_count() {
        size += SEQUENCE_COUNT_LEN;
    }
    if real_time_format {
        size += RUN_IDLE_HEADER_LEN;
    }
    u16::try_from(size)
        .map_err(|_| EipError::validation(format!("Connection size {size} exceeds 65535")))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_pack_16_bit() {
        let params = NetworkConnectionParams::point_to_point(16);
        // P2P 0x4000 | scheduled 0x0800 | size
        assert_eq!(params.to_u16(22).unwrap(), 0x4816);

        let multicast = NetworkConnectionParams::multicast(8)
            .with_priority(Priority::High)
            .with_size_type(SizeType::Variable);
        assert_eq!(multicast.to_u16(8).unwrap(), 0x2000 | 0x0400 | 0x0200 | 8);

        let redundant = NetworkConnectionParams {
            owner: Ownership::Redundant,
            connection_type: ConnectionType::Null,
            priority: Priority::Urgent,
            ..Default::default()
        };
        assert_eq!(redundant.to_u16(0).unwrap(), 0x8C00);
    }

    #[test]
    fn test_pack_16_bit_rejects_large_size() {
        let params = NetworkConnectionParams::point_to_point(600);
        assert!(params.to_u16(0x200).is_err());
        assert!(params.to_u16(0x1FF).is_ok());
    }

    #[test]
    fn test_pack_32_bit() {
        let params = NetworkConnectionParams::point_to_point(1000);
        assert_eq!(params.to_u32(1006), 0x4800_0000 | 1006);
    }

    #[test]
    fn test_transport_type_trigger_byte() {
        assert_eq!(TransportTypeTrigger::default().to_byte(), 0x01);
        let app = TransportTypeTrigger {
            class: TransportClass::Class3,
            trigger: ProductionTrigger::Application,
            direction: TransportDirection::Server,
        };
        assert_eq!(app.to_byte(), 0xA3);
        assert_eq!(
            TransportTypeTrigger::new(TransportClass::Class0, ProductionTrigger::ChangeOfState)
                .to_byte(),
            0x10
        );
    }

    #[test]
    fn test_wire_sizes() {
        let params = ConnectionParameters {
            connection_path: EPath::class_instance(0x04, 100),
            o2t_network_params: NetworkConnectionParams::point_to_point(16),
            t2o_network_params: NetworkConnectionParams::point_to_point(16),
            o2t_real_time_format: true,
            t2o_real_time_format: false,
            ..Default::default()
        };
        assert_eq!(params.o2t_wire_size().unwrap(), 22);
        assert_eq!(params.t2o_wire_size().unwrap(), 18);

        let class0 = ConnectionParameters {
            transport_type_trigger: TransportTypeTrigger::new(
                TransportClass::Class0,
                ProductionTrigger::Cyclic,
            ),
            o2t_real_time_format: false,
            ..params.clone()
        };
        assert_eq!(class0.o2t_wire_size().unwrap(), 16);

        let listen_only = ConnectionParameters {
            o2t_network_params: NetworkConnectionParams::null(),
            ..params
        };
        assert_eq!(listen_only.o2t_wire_size().unwrap(), 0);
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionParameters::default().validate().is_err());

        let params = ConnectionParameters {
            connection_path: EPath::class_instance(0x04, 100),
            ..Default::default()
        };
        assert!(params.validate().is_ok());

        let bad_multiplier = ConnectionParameters {
            connection_timeout_multiplier: 8,
            ..params.clone()
        };
        assert!(matches!(
            bad_multiplier.validate(),
            Err(EipError::Validation(_))
        ));

        let both_null = ConnectionParameters {
            o2t_network_params: NetworkConnectionParams::null(),
            t2o_network_params: NetworkConnectionParams::null(),
            ..params
        };
        assert!(both_null.validate().is_err());
    }
}
