use std::path::PathBuf;

use chrono::{DateTime, Utc};

pub const USAGE: &str = "Usage: wallet_scorer [--as-of <unix-seconds>] [--config <path>] \
[--out-dir <dir>] <path/to/aave_txs.json>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub input: PathBuf,
    pub as_of: Option<DateTime<Utc>>,
    pub config: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
}

/// Errors are human-readable messages; `main` prints `USAGE` and exits 1.
pub fn parse_args<I>(mut args: I) -> std::result::Result<CliArgs, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let mut positional = Vec::new();
    let mut as_of = None;
    let mut config = None;
    let mut out_dir = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--as-of" => {
                let raw = value_for(&mut args, "--as-of")?;
                as_of = Some(parse_as_of(&raw)?);
            }
            "--config" => config = Some(PathBuf::from(value_for(&mut args, "--config")?)),
            "--out-dir" => out_dir = Some(PathBuf::from(value_for(&mut args, "--out-dir")?)),
            other if other.starts_with("--") => return Err(format!("unknown option: {other}")),
            _ => positional.push(arg),
        }
    }

    match <[String; 1]>::try_from(positional) {
        Ok([input]) => Ok(CliArgs {
            input: PathBuf::from(input),
            as_of,
            config,
            out_dir,
        }),
        Err(rest) => Err(format!(
            "expected exactly one input path, got {}",
            rest.len()
        )),
    }
}

fn value_for<I>(args: &mut I, flag: &str) -> std::result::Result<String, String>
where
    I: Iterator<Item = String>,
{
    args.next().ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_as_of(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("--as-of expects unix seconds, got {raw:?}: {e}"))?;
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| format!("--as-of out of range: {secs}"))
}
