//! Explicit messaging commands

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use serde_json::{json, Value};
use voltage_eip::vendor::fanuc::{self, BlockAccess, CartesianPosition};
use voltage_eip::{
    Buffer, EPath, IdentityInfo, MessageRouter, MessageRouterResponse, ServiceCode, Session,
};

/// Element type for generic attribute access
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataType {
    /// 8-bit signed integer
    Sint,
    /// 16-bit signed integer
    Int,
    /// 32-bit signed integer
    Dint,
    /// 32-bit float
    Real,
    /// Bytes as hex
    Raw,
}

#[derive(Subcommand)]
pub enum FanucCommands {
    /// Read R[index] as an integer
    Int { index: u16 },

    /// Read R[index] as a float
    Float { index: u16 },

    /// Read R[first..=last] in one block
    Block {
        first: u16,
        last: u16,
        /// Read the float view of the registers
        #[arg(long)]
        float: bool,
    },

    /// Read SR[index]
    #[command(name = "string")]
    Str { index: u16 },

    /// Read PR[index] in cartesian representation
    Position { index: u16 },

    /// Write PR[index] in cartesian representation
    SetPosition {
        index: u16,
        #[arg(long, default_value_t = 0.0)]
        x: f32,
        #[arg(long, default_value_t = 0.0)]
        y: f32,
        #[arg(long, default_value_t = 0.0)]
        z: f32,
        #[arg(long, default_value_t = 0.0)]
        w: f32,
        #[arg(long, default_value_t = 0.0)]
        p: f32,
        #[arg(long, default_value_t = 0.0)]
        r: f32,
        #[arg(long, default_value_t = 1)]
        utool: i16,
        #[arg(long, default_value_t = 1)]
        uframe: i16,
    },
}

#[derive(Serialize)]
struct Reply {
    service: String,
    path: String,
    status: String,
    value: Value,
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("Hex value needs an even number of digits: '{s}'");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn decode_value(data: &[u8], data_type: DataType) -> Result<Value> {
    let mut buffer = Buffer::from_bytes(data);
    let value = match data_type {
        DataType::Sint => json!(buffer.extract::<i8>()?),
        DataType::Int => json!(buffer.extract::<i16>()?),
        DataType::Dint => json!(buffer.extract::<i32>()?),
        DataType::Real => json!(buffer.extract::<f32>()?),
        DataType::Raw => json!(hex(data)),
    };
    Ok(value)
}

fn encode_value(value: &str, data_type: DataType) -> Result<Vec<u8>> {
    let mut buffer = Buffer::new();
    match data_type {
        DataType::Sint => buffer.append(value.parse::<i8>()?),
        DataType::Int => buffer.append(value.parse::<i16>()?),
        DataType::Dint => buffer.append(value.parse::<i32>()?),
        DataType::Real => buffer.append(value.parse::<f32>()?),
        DataType::Raw => buffer.append_bytes(&parse_hex(value)?),
    };
    Ok(buffer.into_vec())
}

fn report(
    service: ServiceCode,
    path: &EPath,
    response: &MessageRouterResponse,
    value: Value,
    as_json: bool,
) -> Result<()> {
    if as_json {
        let reply = Reply {
            service: service.to_string(),
            path: path.to_string(),
            status: response.status_text(),
            value,
        };
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    if response.is_success() {
        println!("{} {} {}", "OK".green().bold(), service, path);
        match value {
            Value::Null => {},
            Value::String(text) => println!("  {text}"),
            other => println!("  {other}"),
        }
    } else {
        println!(
            "{} {} {}: {}",
            "FAILED".red().bold(),
            service,
            path,
            response.status_text()
        );
    }
    Ok(())
}

async fn request(
    session: &Session,
    service: ServiceCode,
    path: &EPath,
    data: &[u8],
) -> Result<MessageRouterResponse> {
    MessageRouter::new()
        .send_request(session, service, path, data)
        .await
        .with_context(|| format!("{service} {path}"))
}

pub async fn identity(session: &Session, as_json: bool) -> Result<()> {
    let identity = IdentityInfo::read(session).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
        return Ok(());
    }

    println!("{}", "Identity".bright_cyan().bold());
    println!("  Vendor ID:     {}", identity.vendor_id);
    println!("  Device type:   0x{:04X}", identity.device_type);
    println!("  Product code:  {}", identity.product_code);
    println!("  Revision:      {}", identity.revision());
    println!("  Status:        0x{:04X}", identity.status);
    println!("  Serial number: 0x{:08X}", identity.serial_number);
    println!("  Product name:  {}", identity.product_name.trim_end());
    Ok(())
}

pub async fn read(
    session: &Session,
    class: u16,
    instance: u16,
    attribute: u16,
    data_type: DataType,
    as_json: bool,
) -> Result<()> {
    let path = EPath::new(class, instance, attribute);
    read_path(session, &path, data_type, as_json).await
}

async fn read_path(session: &Session, path: &EPath, data_type: DataType, as_json: bool) -> Result<()> {
    let service = ServiceCode::GET_ATTRIBUTE_SINGLE;
    let response = request(session, service, path, &[]).await?;
    let value = if response.is_success() {
        decode_value(&response.data, data_type)?
    } else {
        Value::Null
    };
    report(service, path, &response, value, as_json)
}

pub async fn write(
    session: &Session,
    class: u16,
    instance: u16,
    attribute: u16,
    data_type: DataType,
    value: &str,
    as_json: bool,
) -> Result<()> {
    let path = EPath::new(class, instance, attribute);
    let data = encode_value(value, data_type)?;
    let service = ServiceCode::SET_ATTRIBUTE_SINGLE;
    let response = request(session, service, &path, &data).await?;
    report(service, &path, &response, Value::Null, as_json)
}

pub async fn fanuc(session: &Session, command: FanucCommands, as_json: bool) -> Result<()> {
    match command {
        FanucCommands::Int { index } => {
            read_path(session, &fanuc::int_register(index)?, DataType::Dint, as_json).await
        },
        FanucCommands::Float { index } => {
            read_path(session, &fanuc::float_register(index)?, DataType::Real, as_json).await
        },
        FanucCommands::Block { first, last, float } => {
            let path = if float {
                fanuc::float_register_block(first, last, BlockAccess::Read)?
            } else {
                fanuc::int_register_block(first, last, BlockAccess::Read)?
            };
            let service = BlockAccess::Read.service();
            let response = request(session, service, &path, &[]).await?;

            let mut values = Vec::new();
            if response.is_success() {
                let mut buffer = Buffer::from_bytes(response.data.to_vec());
                for _ in first..=last {
                    let value = if float {
                        json!(buffer.extract::<f32>()?)
                    } else {
                        json!(buffer.extract::<i32>()?)
                    };
                    values.push(value);
                }
            }
            report(service, &path, &response, Value::Array(values), as_json)
        },
        FanucCommands::Str { index } => {
            let path = fanuc::string_register(index)?;
            let service = ServiceCode::GET_ATTRIBUTE_SINGLE;
            let response = request(session, service, &path, &[]).await?;
            let text = String::from_utf8_lossy(&response.data)
                .trim_end_matches('\0')
                .to_string();
            report(service, &path, &response, json!(text), as_json)
        },
        FanucCommands::Position { index } => {
            let path = fanuc::position_register(index)?;
            let service = ServiceCode::GET_ATTRIBUTE_SINGLE;
            let response = request(session, service, &path, &[]).await?;
            let value = if response.is_success() {
                serde_json::to_value(CartesianPosition::decode(&response.data)?)?
            } else {
                Value::Null
            };
            report(service, &path, &response, value, as_json)
        },
        FanucCommands::SetPosition {
            index,
            x,
            y,
            z,
            w,
            p,
            r,
            utool,
            uframe,
        } => {
            let path = fanuc::position_register(index)?;
            let position = CartesianPosition {
                user_tool: utool,
                user_frame: uframe,
                x,
                y,
                z,
                w,
                p,
                r,
                ..Default::default()
            };
            let service = ServiceCode::SET_ATTRIBUTE_SINGLE;
            let response = request(session, service, &path, &position.encode()).await?;
            report(service, &path, &response, Value::Null, as_json)
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_value_codec() {
        assert_eq!(encode_value("-2", DataType::Int).unwrap(), vec![0xFE, 0xFF]);
        assert_eq!(
            decode_value(&[0xFE, 0xFF], DataType::Int).unwrap(),
            json!(-2)
        );
        assert_eq!(
            decode_value(&1.5f32.to_le_bytes(), DataType::Real).unwrap(),
            json!(1.5)
        );
        assert_eq!(
            encode_value("0a 0B", DataType::Raw).unwrap(),
            vec![0x0A, 0x0B]
        );
        assert_eq!(decode_value(&[0x0A, 0x0B], DataType::Raw).unwrap(), json!("0A 0B"));
    }

    #[test]
    fn test_value_codec_errors() {
        assert!(encode_value("300", DataType::Sint).is_err());
        assert!(encode_value("ABC", DataType::Raw).is_err());
        assert!(decode_value(&[0x01], DataType::Dint).is_err());
    }
}
