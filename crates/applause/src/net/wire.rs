//! The command-protocol wire codec.
//!
//! The in-process command message is fixed in field order by the protocol; on
//! the wire every multi-byte field is explicitly little-endian so that
//! cross-host peers agree. A command frame optionally carries one log record
//! right behind it when `LOG_FOLLOWS` is set.

use crate::bus::{CommandFlags, CommandMsg, LogMsg};
use crate::error::{Error, ErrorKind, Result};
use applause_utils::Timespec64;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// flags + fps + sys_seconds + world_seconds + 64-bit timespec.
pub const COMMAND_WIRE_SIZE: usize = 4 * 4 + 8 * 2;
/// timespec + length; the payload follows.
pub const LOG_HEADER_WIRE_SIZE: usize = 8 * 2 + 4;

pub fn encode_command(cmd: &CommandMsg) -> Vec<u8> {
    let mut out = Vec::with_capacity(COMMAND_WIRE_SIZE);
    out.write_u32::<LittleEndian>(cmd.flags.bits()).unwrap();
    out.write_u32::<LittleEndian>(cmd.fps).unwrap();
    out.write_u32::<LittleEndian>(cmd.sys_seconds).unwrap();
    out.write_u32::<LittleEndian>(cmd.world_seconds).unwrap();
    out.write_u64::<LittleEndian>(cmd.time.sec).unwrap();
    out.write_u64::<LittleEndian>(cmd.time.nsec).unwrap();
    out
}

/// Decodes one command frame. `BufferIncomplete` signals a short read: cache
/// and retry with more data.
pub fn decode_command(buf: &[u8]) -> Result<(CommandMsg, usize)> {
    if buf.len() < COMMAND_WIRE_SIZE {
        return Err(Error::new(ErrorKind::BufferIncomplete));
    }
    let mut cursor = Cursor::new(buf);
    let flags = CommandFlags::from_bits_truncate(cursor.read_u32::<LittleEndian>()?);
    let fps = cursor.read_u32::<LittleEndian>()?;
    let sys_seconds = cursor.read_u32::<LittleEndian>()?;
    let world_seconds = cursor.read_u32::<LittleEndian>()?;
    let sec = cursor.read_u64::<LittleEndian>()?;
    let nsec = cursor.read_u64::<LittleEndian>()?;

    Ok((
        CommandMsg {
            flags,
            fps,
            sys_seconds,
            world_seconds,
            time: Timespec64 { sec, nsec },
        },
        COMMAND_WIRE_SIZE,
    ))
}

/// Encodes a log record: 64-bit timespec, length including the terminating
/// NUL, then the payload.
pub fn encode_log_record(ts: Timespec64, msg: &str) -> Vec<u8> {
    let bytes = msg.as_bytes();
    let length = bytes.len() as u32 + 1;
    let mut out = Vec::with_capacity(LOG_HEADER_WIRE_SIZE + length as usize);
    out.write_u64::<LittleEndian>(ts.sec).unwrap();
    out.write_u64::<LittleEndian>(ts.nsec).unwrap();
    out.write_u32::<LittleEndian>(length).unwrap();
    out.extend_from_slice(bytes);
    out.push(0);
    out
}

pub fn decode_log_record(buf: &[u8]) -> Result<(LogMsg, usize)> {
    if buf.len() < LOG_HEADER_WIRE_SIZE {
        return Err(Error::new(ErrorKind::BufferIncomplete));
    }
    let mut cursor = Cursor::new(buf);
    let sec = cursor.read_u64::<LittleEndian>()?;
    let nsec = cursor.read_u64::<LittleEndian>()?;
    let length = cursor.read_u32::<LittleEndian>()? as usize;

    let total = LOG_HEADER_WIRE_SIZE + length;
    if buf.len() < total {
        return Err(Error::new(ErrorKind::BufferIncomplete));
    }
    let payload = &buf[LOG_HEADER_WIRE_SIZE..total];
    // strip the NUL terminator
    let text = payload.split(|b| *b == 0).next().unwrap_or(payload);
    let msg = String::from_utf8_lossy(text).into_owned();

    Ok((
        LogMsg {
            ts: Timespec64 { sec, nsec },
            msg,
        },
        total,
    ))
}

/// A command frame with a log record appended, `LOG_FOLLOWS` forced on.
pub fn encode_command_with_log(mut cmd: CommandMsg, ts: Timespec64, msg: &str) -> Vec<u8> {
    cmd.flags |= CommandFlags::LOG_FOLLOWS;
    let mut out = encode_command(&cmd);
    out.extend_from_slice(&encode_log_record(ts, msg));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trip() {
        let cmd = CommandMsg {
            flags: CommandFlags::STATUS | CommandFlags::CONNECT,
            fps: 60,
            sys_seconds: 1234,
            world_seconds: 99,
            time: Timespec64 {
                sec: 1_700_000_000,
                nsec: 123_456_789,
            },
        };
        let wire = encode_command(&cmd);
        assert_eq!(wire.len(), COMMAND_WIRE_SIZE);

        let (decoded, used) = decode_command(&wire).unwrap();
        assert_eq!(used, COMMAND_WIRE_SIZE);
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn short_command_reads_need_more() {
        let wire = encode_command(&CommandMsg::default());
        for cut in 0..COMMAND_WIRE_SIZE {
            let err = decode_command(&wire[..cut]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BufferIncomplete);
        }
    }

    #[test]
    fn fields_are_little_endian() {
        let cmd = CommandMsg {
            fps: 0x0102_0304,
            ..CommandMsg::default()
        };
        let wire = encode_command(&cmd);
        assert_eq!(&wire[4..8], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn log_record_round_trip_with_trailer() {
        let ts = Timespec64 { sec: 5, nsec: 6 };
        let wire = encode_log_record(ts, "hello world");
        let (record, used) = decode_log_record(&wire).unwrap();
        assert_eq!(used, wire.len());
        assert_eq!(record.ts, ts);
        assert_eq!(record.msg, "hello world");

        // a partial payload is a short read, not garbage
        let err = decode_log_record(&wire[..wire.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferIncomplete);
    }

    #[test]
    fn combined_frame_sets_log_follows() {
        let wire = encode_command_with_log(
            CommandMsg::default(),
            Timespec64 { sec: 1, nsec: 2 },
            "shipped",
        );
        let (cmd, used) = decode_command(&wire).unwrap();
        assert!(cmd.flags.contains(CommandFlags::LOG_FOLLOWS));
        let (record, _) = decode_log_record(&wire[used..]).unwrap();
        assert_eq!(record.msg, "shipped");
    }
}
