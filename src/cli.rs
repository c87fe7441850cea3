use crate::command::{AppCommand, PathArgs, ReachArgs};
use anyhow::Result;
use std::path::PathBuf;

pub type CliCommand = AppCommand;

const COMMANDS: &[&str] = &["paths", "reach", "watch", "suppression", "export"];

pub fn version_text() -> String {
    format!("nexus-topology {}", env!("CARGO_PKG_VERSION"))
}

pub fn usage_text() -> String {
    format!(
        "{version}
NEXUS Topology: path search, link confidence and suppression-aware reachability

Usage:
  nexus-topology paths <SOURCE> <TARGET> [--snapshot <PATH>] [--max-hops <N>] [--max-paths <N>]
                       [--prefer-l2] [--no-l3] [--include-down]
  nexus-topology reach <SOURCE> <TARGET> [--snapshot <PATH>] [--timeout-ms <N>] [--retries <N>]
                       [--include-suppressed] [--no-dependencies]
  nexus-topology watch <SOURCE> <TARGET> [--snapshot <PATH>] [--interval <SECS>] [--ticks <N>]
                       [--timeout-ms <N>] [--retries <N>] [--include-suppressed] [--no-dependencies]
  nexus-topology suppression [--snapshot <PATH>] [--device <ID>]
  nexus-topology export [--snapshot <PATH>]
  nexus-topology --help
  nexus-topology --version

Options:
  -s, --snapshot <PATH>     Topology document (JSON); defaults to $NEXUS_SNAPSHOT
      --max-hops <N>        Paths: hop bound
      --max-paths <N>       Paths: ranked alternatives to return
      --prefer-l2           Paths: favour switched hops over routed ones
      --no-l3               Paths: forbid hops that cross broadcast domains
      --include-down        Paths: allow links reported down
      --timeout-ms <N>      Reach/watch: per-attempt timeout
      --retries <N>         Reach/watch: retries after the first attempt
      --include-suppressed  Reach/watch: escalate failures explained upstream
      --no-dependencies     Reach/watch: skip the dependency graph
      --interval <SECS>     Watch: seconds between checks
      --ticks <N>           Watch: stop after N checks (default: until Ctrl+C)
      --device <ID>         Suppression: explain a single device
  -h, --help                Show this help text
  -V, --version             Show version

Endpoints are `device:<ID>`, `interface:<ID>` or a bare id (devices win).",
        version = version_text(),
    )
}

fn invalid(flag: &str, raw: &str, expected: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Invalid value for {}: '{}'. Expected {}.\n\n{}",
        flag,
        raw,
        expected,
        usage_text()
    )
}

fn parse_positive<T>(flag: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.parse::<T>()
        .ok()
        .filter(|v| *v > T::default())
        .ok_or_else(|| invalid(flag, raw, "a positive integer"))
}

fn parse_count(flag: &str, raw: &str) -> Result<u32> {
    raw.parse::<u32>()
        .map_err(|_| invalid(flag, raw, "a non-negative integer"))
}

/// Value of a flag, either inline (`--flag=value`) or the next argument.
fn flag_value<S: AsRef<str>>(
    flag: &str,
    inline: Option<&str>,
    rest: &mut impl Iterator<Item = S>,
) -> Result<String> {
    let value = match inline {
        Some(value) => value.to_string(),
        None => rest
            .next()
            .map(|v| v.as_ref().to_string())
            .unwrap_or_default(),
    };
    if value.is_empty() {
        return Err(anyhow::anyhow!(
            "Missing value for {}.\n\n{}",
            flag,
            usage_text()
        ));
    }
    Ok(value)
}

fn endpoints(command: &str, positionals: Vec<String>) -> Result<(String, String)> {
    match <[String; 2]>::try_from(positionals) {
        Ok([source, target]) => Ok((source, target)),
        Err(got) => Err(anyhow::anyhow!(
            "{} expects <SOURCE> <TARGET>, got {} argument(s).\n\n{}",
            command,
            got.len(),
            usage_text()
        )),
    }
}

fn reject(condition: bool, flags: &str, command: &str) -> Result<()> {
    if condition {
        return Err(anyhow::anyhow!(
            "{} not valid with {}.\n\n{}",
            flags,
            command,
            usage_text()
        ));
    }
    Ok(())
}

pub fn parse_cli_args<I, S>(args: I) -> Result<AppCommand>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut command: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();
    let mut snapshot: Option<PathBuf> = None;
    let mut path = PathArgs::default();
    let mut reach = ReachArgs::default();
    let mut ticks: Option<u32> = None;
    let mut device: Option<String> = None;

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref().to_string();
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
            _ => (arg.as_str(), None),
        };

        match (flag, inline) {
            ("-h" | "--help", None) => return Ok(AppCommand::Help),
            ("-V" | "--version", None) => return Ok(AppCommand::Version),
            ("--prefer-l2", None) => path.prefer_l2 = true,
            ("--no-l3", None) => path.no_l3 = true,
            ("--include-down", None) => path.include_down = true,
            ("--include-suppressed", None) => reach.include_suppressed = true,
            ("--no-dependencies", None) => reach.no_dependencies = true,
            ("-s" | "--snapshot", _) => {
                snapshot = Some(PathBuf::from(flag_value(flag, inline, &mut iter)?));
            }
            ("--max-hops", _) => {
                let raw = flag_value(flag, inline, &mut iter)?;
                path.max_hops = Some(parse_positive(flag, &raw)?);
            }
            ("--max-paths", _) => {
                let raw = flag_value(flag, inline, &mut iter)?;
                path.max_paths = Some(parse_positive(flag, &raw)?);
            }
            ("--timeout-ms", _) => {
                let raw = flag_value(flag, inline, &mut iter)?;
                reach.timeout_ms = Some(parse_positive(flag, &raw)?);
            }
            ("--retries", _) => {
                let raw = flag_value(flag, inline, &mut iter)?;
                reach.retries = Some(parse_count(flag, &raw)?);
            }
            ("--interval", _) => {
                let raw = flag_value(flag, inline, &mut iter)?;
                reach.interval_secs = Some(parse_positive(flag, &raw)?);
            }
            ("--ticks", _) => {
                let raw = flag_value(flag, inline, &mut iter)?;
                ticks = Some(parse_positive(flag, &raw)?);
            }
            ("--device", _) => device = Some(flag_value(flag, inline, &mut iter)?),
            _ if arg.starts_with('-') => {
                return Err(anyhow::anyhow!(
                    "Unknown argument: {arg}\n\n{}",
                    usage_text()
                ));
            }
            _ if command.is_none() => {
                if !COMMANDS.contains(&arg.as_str()) {
                    return Err(anyhow::anyhow!(
                        "Unknown command: {arg}. Use one of: {}.\n\n{}",
                        COMMANDS.join(", "),
                        usage_text()
                    ));
                }
                command = Some(arg.clone());
            }
            _ => positionals.push(arg.clone()),
        }
    }

    let path_flags = path != PathArgs::default();
    let reach_flags = reach != ReachArgs::default();

    let Some(selected) = command else {
        if snapshot.is_none() && !path_flags && !reach_flags && ticks.is_none() && device.is_none() {
            return Ok(AppCommand::Help);
        }
        return Err(anyhow::anyhow!(
            "Missing command. Use one of: {}.\n\n{}",
            COMMANDS.join(", "),
            usage_text()
        ));
    };

    match selected.as_str() {
        "paths" => {
            reject(
                reach_flags || ticks.is_some() || device.is_some(),
                "--timeout-ms/--retries/--interval/--ticks/--device are",
                "paths",
            )?;
            let (source, target) = endpoints("paths", positionals)?;
            Ok(AppCommand::Paths {
                snapshot,
                source,
                target,
                args: path,
            })
        }
        "reach" => {
            reject(
                path_flags || ticks.is_some() || device.is_some(),
                "path options, --ticks and --device are",
                "reach",
            )?;
            reject(reach.interval_secs.is_some(), "--interval is", "reach (use watch)")?;
            let (source, target) = endpoints("reach", positionals)?;
            Ok(AppCommand::Reach {
                snapshot,
                source,
                target,
                args: reach,
            })
        }
        "watch" => {
            reject(
                path_flags || device.is_some(),
                "path options and --device are",
                "watch",
            )?;
            let (source, target) = endpoints("watch", positionals)?;
            Ok(AppCommand::Watch {
                snapshot,
                source,
                target,
                args: reach,
                ticks,
            })
        }
        "suppression" => {
            reject(
                path_flags || reach_flags || ticks.is_some(),
                "path and probe options are",
                "suppression",
            )?;
            reject(!positionals.is_empty(), "positional arguments are", "suppression")?;
            Ok(AppCommand::Suppression { snapshot, device })
        }
        "export" => {
            reject(
                path_flags || reach_flags || ticks.is_some() || device.is_some(),
                "options other than --snapshot are",
                "export",
            )?;
            reject(!positionals.is_empty(), "positional arguments are", "export")?;
            Ok(AppCommand::Export { snapshot })
        }
        other => Err(anyhow::anyhow!(
            "Unknown command: {other}.\n\n{}",
            usage_text()
        )),
    }
}
