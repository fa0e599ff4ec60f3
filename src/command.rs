//! Interactive commands.
//!
//! This module defines the [`Command`] enum, which encapsulates one line typed at the
//! `btrdb_cli` prompt, and the parsing from raw input into a command.
//!
//! # Overview
//! Supported commands:
//!
//! - `values <uuid> <start> <end> [version]`: Raw points in a time range.
//! - `stats <uuid> <start> <end> <point_width> [version]`: Aggregates over power-of-two windows.
//! - `window <uuid> <start> <end> <width> [depth] [version]`: Aggregates over arbitrary windows.
//! - `version <uuid>...`: Latest version of each stream.
//! - `nearest <uuid> <time> <forward|backward> [version]`: Closest point to a time.
//! - `changed <uuid> <from> <to> <resolution>`: Ranges changed between two versions.
//! - `insert <uuid> [sync] <time>:<value>...`: Insert points.
//! - `delete <uuid> <start> <end>`: Delete points in a time range.
//! - `.exit`: Leave the prompt.
//!
//! Commands are run with [`Command::execute`] on a
//! [`RequestContext`](crate::client::RequestContext).
//!
//! # Example
//! ```rust
//! use btrdb::{Command, StreamId};
//!
//! let cmd: Command = "version 0123abcd456789ef0123456789abcdef".try_into().unwrap();
//! let uuid: StreamId = "0123abcd456789ef0123456789abcdef".parse().unwrap();
//! assert_eq!(cmd, Command::Version(vec![uuid]));
//! ```
use std::{fmt::Write, str::FromStr};

use thiserror::Error;

use crate::{
    client::{ClientError, RequestContext},
    protocol::Stream,
    types::{RawPoint, StreamId},
};

/// List of possible error that a command can throw.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,
}

/// One request typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Values {
        uuid: StreamId,
        start: i64,
        end: i64,
        version: u64,
    },
    Stats {
        uuid: StreamId,
        start: i64,
        end: i64,
        point_width: u8,
        version: u64,
    },
    Window {
        uuid: StreamId,
        start: i64,
        end: i64,
        width: u64,
        depth: u8,
        version: u64,
    },
    Version(Vec<StreamId>),
    Nearest {
        uuid: StreamId,
        time: i64,
        backward: bool,
        version: u64,
    },
    Changed {
        uuid: StreamId,
        from: u64,
        to: u64,
        resolution: u8,
    },
    Insert {
        uuid: StreamId,
        points: Vec<RawPoint>,
        sync: bool,
    },
    Delete {
        uuid: StreamId,
        start: i64,
        end: i64,
    },
}

/// Positional arguments of one command, consumed left to right.
struct Args<'a> {
    command: &'a str,
    parts: std::slice::Iter<'a, &'a str>,
    usage: &'static str,
}

impl<'a> Args<'a> {
    fn invalid(&self, reason: String) -> CommandError {
        CommandError::InvalidCommandArguments {
            command: self.command.to_string(),
            reason,
        }
    }

    fn parse<T: FromStr>(&self, name: &str, raw: &str) -> Result<T, CommandError> {
        raw.parse()
            .map_err(|_| self.invalid(format!("invalid {name} '{raw}'. Example: {}", self.usage)))
    }

    fn required<T: FromStr>(&mut self, name: &str) -> Result<T, CommandError> {
        match self.parts.next() {
            Some(raw) => self.parse(name, raw),
            None => Err(self.invalid(format!("missing {name}. Example: {}", self.usage))),
        }
    }

    fn optional<T: FromStr + Default>(&mut self, name: &str) -> Result<T, CommandError> {
        match self.parts.next() {
            Some(raw) => self.parse(name, raw),
            None => Ok(T::default()),
        }
    }

    fn finish(mut self) -> Result<(), CommandError> {
        match self.parts.next() {
            Some(extra) => Err(self.invalid(format!("unexpected argument '{extra}'"))),
            None => Ok(()),
        }
    }
}

fn parse_point(args: &Args, raw: &str) -> Result<RawPoint, CommandError> {
    let (time, value) = raw
        .split_once(':')
        .ok_or_else(|| args.invalid(format!("point '{raw}' should be <time>:<value>")))?;
    Ok(RawPoint::new(
        args.parse("time", time)?,
        args.parse("value", value)?,
    ))
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        let Some((name, rest)) = parts.split_first() else {
            return Err(CommandError::Empty);
        };
        let usage = match name.to_lowercase().as_str() {
            ".exit" => return Ok(Command::Exit),
            "values" => "values <uuid> <start> <end> [version]",
            "stats" => "stats <uuid> <start> <end> <point_width> [version]",
            "window" => "window <uuid> <start> <end> <width> [depth] [version]",
            "version" => "version <uuid>...",
            "nearest" => "nearest <uuid> <time> <forward|backward> [version]",
            "changed" => "changed <uuid> <from> <to> <resolution>",
            "insert" => "insert <uuid> [sync] <time>:<value>...",
            "delete" => "delete <uuid> <start> <end>",
            _ => return Err(CommandError::UnrecognizedCommand(value.trim().to_string())),
        };
        let mut args = Args {
            command: *name,
            parts: rest.iter(),
            usage,
        };

        let cmd = match name.to_lowercase().as_str() {
            "values" => Command::Values {
                uuid: args.required("uuid")?,
                start: args.required("start")?,
                end: args.required("end")?,
                version: args.optional("version")?,
            },
            "stats" => Command::Stats {
                uuid: args.required("uuid")?,
                start: args.required("start")?,
                end: args.required("end")?,
                point_width: args.required("point_width")?,
                version: args.optional("version")?,
            },
            "window" => Command::Window {
                uuid: args.required("uuid")?,
                start: args.required("start")?,
                end: args.required("end")?,
                width: args.required("width")?,
                depth: args.optional("depth")?,
                version: args.optional("version")?,
            },
            "version" => {
                let uuids = rest
                    .iter()
                    .map(|raw| args.parse("uuid", raw))
                    .collect::<Result<Vec<StreamId>, _>>()?;
                if uuids.is_empty() {
                    return Err(args.invalid(format!("missing uuid. Example: {usage}")));
                }
                return Ok(Command::Version(uuids));
            }
            "nearest" => {
                let uuid = args.required("uuid")?;
                let time = args.required("time")?;
                let backward = match args.required::<String>("direction")?.as_str() {
                    "backward" => true,
                    "forward" => false,
                    other => {
                        return Err(
                            args.invalid(format!("direction '{other}' is not forward or backward"))
                        );
                    }
                };
                Command::Nearest {
                    uuid,
                    time,
                    backward,
                    version: args.optional("version")?,
                }
            }
            "changed" => Command::Changed {
                uuid: args.required("uuid")?,
                from: args.required("from")?,
                to: args.required("to")?,
                resolution: args.required("resolution")?,
            },
            "insert" => {
                let uuid = args.required("uuid")?;
                let mut points = &rest[1.min(rest.len())..];
                let sync = points.first() == Some(&"sync");
                if sync {
                    points = &points[1..];
                }
                let points = points
                    .iter()
                    .map(|raw| parse_point(&args, raw))
                    .collect::<Result<Vec<_>, _>>()?;
                if points.is_empty() {
                    return Err(args.invalid(format!("no points given. Example: {usage}")));
                }
                return Ok(Command::Insert { uuid, points, sync });
            }
            "delete" => Command::Delete {
                uuid: args.required("uuid")?,
                start: args.required("start")?,
                end: args.required("end")?,
            },
            _ => unreachable!("command names are matched above"),
        };

        args.finish()?;
        Ok(cmd)
    }
}

fn version_line(out: &mut String, version: Option<u64>) {
    match version {
        Some(v) => {
            let _ = writeln!(out, "version {v}");
        }
        None => out.push_str("version unknown\n"),
    }
}

impl Command {
    /// Runs the command on `ctx` and renders the result for display.
    pub fn execute<S: Stream>(self, ctx: &mut RequestContext<'_, S>) -> Result<String, ClientError> {
        let mut out = String::new();

        match self {
            Command::Exit => {}
            Command::Values {
                uuid,
                start,
                end,
                version,
            } => {
                let (points, version) = ctx.query_standard_values(uuid, start, end, version)?;
                for p in points {
                    let _ = writeln!(out, "{}\t{}", p.time, p.value);
                }
                version_line(&mut out, version);
            }
            Command::Stats {
                uuid,
                start,
                end,
                point_width,
                version,
            } => {
                let (points, version) =
                    ctx.query_statistical_values(uuid, start, end, point_width, version)?;
                for p in points {
                    let _ = writeln!(
                        out,
                        "{}\tcount={} min={} mean={} max={}",
                        p.time, p.count, p.min, p.mean, p.max
                    );
                }
                version_line(&mut out, version);
            }
            Command::Window {
                uuid,
                start,
                end,
                width,
                depth,
                version,
            } => {
                let (points, version) =
                    ctx.query_window_values(uuid, start, end, width, depth, version)?;
                for p in points {
                    let _ = writeln!(
                        out,
                        "{}\tcount={} min={} mean={} max={}",
                        p.time, p.count, p.min, p.mean, p.max
                    );
                }
                version_line(&mut out, version);
            }
            Command::Version(uuids) => {
                let versions = ctx.query_version(&uuids)?;
                for (uuid, v) in uuids.iter().zip(versions) {
                    let _ = writeln!(out, "{uuid}\t{v}");
                }
            }
            Command::Nearest {
                uuid,
                time,
                backward,
                version,
            } => {
                let (points, version) = ctx.query_nearest_value(uuid, time, backward, version)?;
                for p in points {
                    let _ = writeln!(out, "{}\t{}", p.time, p.value);
                }
                version_line(&mut out, version);
            }
            Command::Changed {
                uuid,
                from,
                to,
                resolution,
            } => {
                let (ranges, version) = ctx.query_changed_ranges(uuid, from, to, resolution)?;
                for r in ranges {
                    let _ = writeln!(out, "{}\t{}", r.start_time, r.end_time);
                }
                version_line(&mut out, version);
            }
            Command::Insert { uuid, points, sync } => {
                out = ctx.insert_values(uuid, &points, sync)?;
            }
            Command::Delete { uuid, start, end } => {
                out = ctx.delete_values(uuid, start, end)?;
            }
        }

        Ok(out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "0123abcd-4567-89ef-0123-456789abcdef";

    fn uuid() -> StreamId {
        UUID.parse().unwrap()
    }

    fn parse(line: &str) -> Result<Command, CommandError> {
        Command::try_from(line)
    }

    #[test]
    fn command_from_string() {
        let inputs = vec![
            (".exit".to_string(), Command::Exit),
            (
                format!("values {UUID} 0 100"),
                Command::Values {
                    uuid: uuid(),
                    start: 0,
                    end: 100,
                    version: 0,
                },
            ),
            (
                format!("STATS {UUID} -5 5 3 7"),
                Command::Stats {
                    uuid: uuid(),
                    start: -5,
                    end: 5,
                    point_width: 3,
                    version: 7,
                },
            ),
            (
                format!("window {UUID} 0 10 2"),
                Command::Window {
                    uuid: uuid(),
                    start: 0,
                    end: 10,
                    width: 2,
                    depth: 0,
                    version: 0,
                },
            ),
            (
                format!("nearest {UUID} 50 backward"),
                Command::Nearest {
                    uuid: uuid(),
                    time: 50,
                    backward: true,
                    version: 0,
                },
            ),
            (
                format!("changed {UUID} 1 4 10"),
                Command::Changed {
                    uuid: uuid(),
                    from: 1,
                    to: 4,
                    resolution: 10,
                },
            ),
            (
                format!("delete {UUID} 3 9"),
                Command::Delete {
                    uuid: uuid(),
                    start: 3,
                    end: 9,
                },
            ),
        ];

        for (line, expected) in inputs {
            assert_eq!(parse(&line).unwrap(), expected, "{line}");
        }
    }

    #[test]
    fn insert_points() {
        assert_eq!(
            parse(&format!("insert {UUID} sync 1:0.5 2:-1")).unwrap(),
            Command::Insert {
                uuid: uuid(),
                points: vec![RawPoint::new(1, 0.5), RawPoint::new(2, -1.0)],
                sync: true,
            }
        );
        assert_eq!(
            parse(&format!("insert {UUID} 1:2")).unwrap(),
            Command::Insert {
                uuid: uuid(),
                points: vec![RawPoint::new(1, 2.0)],
                sync: false,
            }
        );
        assert!(parse(&format!("insert {UUID}")).is_err());
        assert!(parse(&format!("insert {UUID} 12")).is_err());
    }

    #[test]
    fn version_takes_many_uuids() {
        let other: StreamId = StreamId::from(1);
        assert_eq!(
            parse(&format!("version {UUID} {other}")).unwrap(),
            Command::Version(vec![uuid(), other])
        );
        assert!(parse("version").is_err());
    }

    #[test]
    fn empty_line() {
        assert_eq!(parse("   "), Err(CommandError::Empty));
    }

    #[test]
    fn unrecognized_command() {
        assert_eq!(
            parse(".structure"),
            Err(CommandError::UnrecognizedCommand(".structure".into()))
        );
    }

    #[test]
    fn bad_arguments() {
        assert!(matches!(
            parse(&format!("values {UUID} 0")),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(
            parse("values nope 0 1"),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(
            parse(&format!("nearest {UUID} 1 sideways")),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
        assert!(matches!(
            parse(&format!("delete {UUID} 0 1 2")),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
    }
}
