//! Command-line entry for the `faid-miner` binary.

use std::path::PathBuf;
use std::time::Duration;

use faid_consensus::params::hash256_to_hex;
use faid_consensus::{chain_params, Network};
use faid_log::{log_info, Format, Level};
use faid_primitives::block::BlockHeader;

use crate::config::{load_conf, parse_number, MinerConfig};
use crate::memory::MemoryNode;
use crate::pool::pool_search_with_budget;
use crate::solo::SoloMiner;

#[derive(Debug, Clone, PartialEq)]
enum CliAction {
    PoolSearch(PoolArgs),
    Generate { blocks: u32 },
    PrintHelp,
    PrintVersion,
}

#[derive(Debug, Clone, PartialEq)]
struct PoolArgs {
    header: BlockHeader,
    begin: u64,
    end: u64,
    bits: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Overrides {
    conf: Option<PathBuf>,
    network: Option<Network>,
    threads: Option<i32>,
    block_max_size: Option<u32>,
    block_priority_size: Option<u32>,
    block_min_size: Option<u32>,
    block_version: Option<i32>,
    sort_by_fee: bool,
    release_orphans: bool,
    log_level: Option<Level>,
    log_format: Option<Format>,
    pool_timeout: Option<Duration>,
}

impl Overrides {
    fn apply(&self, config: &mut MinerConfig) {
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(size) = self.block_max_size {
            config.block_max_size = size;
        }
        if let Some(size) = self.block_priority_size {
            config.block_priority_size = size;
        }
        if let Some(size) = self.block_min_size {
            config.block_min_size = size;
        }
        if let Some(version) = self.block_version {
            config.block_version = Some(version);
        }
        config.sort_by_fee |= self.sort_by_fee;
        config.release_orphans |= self.release_orphans;
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(timeout) = self.pool_timeout {
            config.pool_timeout = timeout;
        }
        config.clamp();
    }
}

fn usage() -> String {
    [
        "Usage:",
        "  faid-miner <command> [options]",
        "",
        "Commands:",
        "  pool-search     Search a nonce range of one header, print the winning nonce or 0",
        "  generate        Mine blocks on an in-memory regtest chain and print their hashes",
        "  help            Print this help and exit",
        "  version         Print version and exit",
        "",
        "pool-search options:",
        "  --header <hex>  Serialized block header",
        "  --begin <n>     First nonce of the range",
        "  --end <n>       End of the range (exclusive)",
        "  --bits <n>      Compact target override, 0 uses the header bits (default: 0)",
        "  --timeout <s>   Per-worker budget in seconds (default: 60)",
        "",
        "generate options:",
        "  --blocks <n>    Blocks to mine (default: 1)",
        "",
        "Options:",
        "  --conf <path>   Config file in key=value form",
        "  --threads <n>   Worker threads, -1 for the chain default (default: -1)",
        "  --testnet       Use testnet parameters",
        "  --regtest       Use regtest parameters",
        "  --blockmaxsize <n>       Largest candidate in bytes (default: 750000)",
        "  --blockprioritysize <n>  Bytes reserved for high-priority transactions (default: 50000)",
        "  --blockminsize <n>       Fill with low-fee transactions up to this size (default: 0)",
        "  --blockversion <n>       Header version override, regtest only",
        "  --sortbyfee     Order by fee rate from the start",
        "  --releaseorphans  Select dependent transactions once their parents are in",
        "  --log-level     Log verbosity (error|warn|info|debug|trace) (default: info)",
        "  --log-format    Log output format (text|json) (default: text)",
        "  --help, -h      Print this help and exit",
        "  --version, -V   Print version and exit",
    ]
    .join("\n")
}

fn decode_hex(input: &str) -> Result<Vec<u8>, String> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }
    if hex.is_empty() || hex.len() % 2 == 1 {
        return Err("invalid hex string".to_string());
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        let byte = hex
            .get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(|| "invalid hex string".to_string())?;
        bytes.push(byte);
    }
    Ok(bytes)
}

fn parse_u32_value(flag: &str, value: &str) -> Result<u32, String> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    };
    parsed.ok_or_else(|| format!("invalid value '{value}' for {flag}\n{}", usage()))
}

fn parse_args_from<I>(raw_args: I) -> Result<(CliAction, Overrides), String>
where
    I: IntoIterator<Item = String>,
{
    let mut overrides = Overrides::default();
    let mut command: Option<String> = None;
    let mut header: Option<BlockHeader> = None;
    let mut begin: Option<u64> = None;
    let mut end: Option<u64> = None;
    let mut bits: u32 = 0;
    let mut blocks: u32 = 1;

    let mut args = raw_args.into_iter();
    while let Some(arg) = args.next() {
        let mut value_for = |flag: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {flag}\n{}", usage()))
        };
        let number_err = |err: crate::config::ConfigError| format!("{err}\n{}", usage());
        match arg.as_str() {
            "pool-search" | "generate" if command.is_none() => command = Some(arg.clone()),
            "help" | "--help" | "-h" => return Ok((CliAction::PrintHelp, overrides)),
            "version" | "--version" | "-V" => return Ok((CliAction::PrintVersion, overrides)),
            "--header" => {
                let value = value_for("--header")?;
                let bytes = decode_hex(&value)?;
                let decoded = BlockHeader::consensus_decode(&bytes)
                    .map_err(|err| format!("invalid header: {err}"))?;
                header = Some(decoded);
            }
            "--begin" => {
                let raw = value_for("--begin")?;
                begin = Some(parse_number("--begin", &raw).map_err(number_err)?);
            }
            "--end" => {
                let raw = value_for("--end")?;
                end = Some(parse_number("--end", &raw).map_err(number_err)?);
            }
            "--bits" => bits = parse_u32_value("--bits", &value_for("--bits")?)?,
            "--blocks" => {
                blocks = parse_number("--blocks", &value_for("--blocks")?).map_err(number_err)?;
            }
            "--timeout" => {
                let secs: u64 =
                    parse_number("--timeout", &value_for("--timeout")?).map_err(number_err)?;
                overrides.pool_timeout = Some(Duration::from_secs(secs));
            }
            "--conf" => overrides.conf = Some(PathBuf::from(value_for("--conf")?)),
            "--threads" | "--genproclimit" => {
                overrides.threads =
                    Some(parse_number("--threads", &value_for("--threads")?).map_err(number_err)?)
            }
            "--testnet" => overrides.network = Some(Network::Testnet),
            "--regtest" => overrides.network = Some(Network::Regtest),
            "--blockmaxsize" => {
                overrides.block_max_size = Some(
                    parse_number("--blockmaxsize", &value_for("--blockmaxsize")?)
                        .map_err(number_err)?,
                )
            }
            "--blockprioritysize" => {
                overrides.block_priority_size = Some(
                    parse_number("--blockprioritysize", &value_for("--blockprioritysize")?)
                        .map_err(number_err)?,
                )
            }
            "--blockminsize" => {
                overrides.block_min_size = Some(
                    parse_number("--blockminsize", &value_for("--blockminsize")?)
                        .map_err(number_err)?,
                )
            }
            "--blockversion" => {
                overrides.block_version = Some(
                    parse_number("--blockversion", &value_for("--blockversion")?)
                        .map_err(number_err)?,
                )
            }
            "--sortbyfee" => overrides.sort_by_fee = true,
            "--releaseorphans" => overrides.release_orphans = true,
            "--log-level" | "--loglevel" => {
                let value = value_for("--log-level")?;
                overrides.log_level = Some(
                    Level::parse(&value)
                        .ok_or_else(|| format!("invalid log level '{value}'\n{}", usage()))?,
                );
            }
            "--log-format" | "--logformat" => {
                let value = value_for("--log-format")?;
                overrides.log_format = Some(
                    Format::parse(&value)
                        .ok_or_else(|| format!("invalid log format '{value}'\n{}", usage()))?,
                );
            }
            other => return Err(format!("unknown argument '{other}'\n{}", usage())),
        }
    }

    let action = match command.as_deref() {
        Some("pool-search") => {
            let header =
                header.ok_or_else(|| format!("pool-search needs --header\n{}", usage()))?;
            let begin = begin.unwrap_or(0);
            let end = end.ok_or_else(|| format!("pool-search needs --end\n{}", usage()))?;
            CliAction::PoolSearch(PoolArgs {
                header,
                begin,
                end,
                bits,
            })
        }
        Some("generate") => CliAction::Generate { blocks },
        _ => CliAction::PrintHelp,
    };
    Ok((action, overrides))
}

fn resolve_config(overrides: &Overrides) -> Result<MinerConfig, String> {
    let mut config = MinerConfig::default();
    if let Some(path) = &overrides.conf {
        match load_conf(path).map_err(|err| err.to_string())? {
            Some(conf) => config.apply_conf(&conf).map_err(|err| err.to_string())?,
            None => return Err(format!("config file {} not found", path.display())),
        }
    }
    overrides.apply(&mut config);
    Ok(config)
}

fn run_pool_search(args: PoolArgs, config: &MinerConfig) -> Result<(), String> {
    let params = chain_params(config.network);
    let workers = MinerConfig {
        generate: true,
        ..config.clone()
    }
    .worker_count(&params)
    .max(1);
    let nonce = pool_search_with_budget(
        &args.header,
        args.begin,
        args.end,
        workers,
        args.bits,
        config.pool_timeout,
    )
    .map_err(|err| err.to_string())?;
    println!("{nonce}");
    Ok(())
}

fn run_generate(blocks: u32, config: MinerConfig) -> Result<(), String> {
    let params = chain_params(Network::Regtest);
    let config = MinerConfig {
        network: Network::Regtest,
        generate: true,
        ..config
    };
    let node = MemoryNode::new(&params);
    let start = node.chain.height();
    let target = start.saturating_add(blocks);
    while node.chain.height() < target {
        let mut miner = SoloMiner::start(node.handles(), params.clone(), config.clone())
            .map_err(|err| err.to_string())?;
        miner.join().map_err(|err| err.to_string())?;
        if miner.blocks_found() == 0 {
            return Err("miner stopped without finding a block".to_string());
        }
    }
    log_info!("generated {} blocks", node.chain.height() - start);
    for height in start + 1..=node.chain.height() {
        if let Some(block) = node.chain.block(height) {
            println!("{}", hash256_to_hex(&block.hash()));
        }
    }
    Ok(())
}

pub fn run_entry() -> Result<(), String> {
    let (action, overrides) = parse_args_from(std::env::args().skip(1))?;
    match action {
        CliAction::PrintHelp => {
            println!("{}", usage());
            Ok(())
        }
        CliAction::PrintVersion => {
            println!("faid-miner {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::PoolSearch(args) => {
            let config = resolve_config(&overrides)?;
            faid_log::init(config.log_config());
            run_pool_search(args, &config)
        }
        CliAction::Generate { blocks } => {
            let config = resolve_config(&overrides)?;
            faid_log::init(config.log_config());
            run_generate(blocks, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_pool_search() {
        let header = BlockHeader {
            bits: 0x207f_ffff,
            height: 9,
            ..BlockHeader::default()
        };
        let hex: String = header
            .consensus_encode()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        let (action, overrides) = parse_args_from(args(&[
            "pool-search",
            "--header",
            &hex,
            "--begin",
            "5",
            "--end",
            "500",
            "--bits",
            "0x1d00ffff",
            "--threads",
            "3",
        ]))
        .expect("parse");
        assert_eq!(
            action,
            CliAction::PoolSearch(PoolArgs {
                header,
                begin: 5,
                end: 500,
                bits: 0x1d00_ffff,
            })
        );
        assert_eq!(overrides.threads, Some(3));
    }

    #[test]
    fn flags_override_config() {
        let (action, overrides) = parse_args_from(args(&[
            "generate",
            "--blocks",
            "4",
            "--blockmaxsize",
            "20",
            "--sortbyfee",
            "--log-level",
            "debug",
        ]))
        .expect("parse");
        assert_eq!(action, CliAction::Generate { blocks: 4 });
        let config = resolve_config(&overrides).expect("config");
        assert_eq!(config.block_max_size, 1000);
        assert!(config.sort_by_fee);
        assert_eq!(config.log_level, Level::Debug);
    }

    #[test]
    fn rejects_unknown_and_incomplete() {
        assert!(parse_args_from(args(&["--frobnicate"])).is_err());
        assert!(parse_args_from(args(&["pool-search", "--end", "10"])).is_err());
        assert!(parse_args_from(args(&["generate", "--blocks"])).is_err());
        assert_eq!(
            parse_args_from(args(&[])).expect("empty").0,
            CliAction::PrintHelp
        );
    }

    #[test]
    fn hex_decoding() {
        assert_eq!(decode_hex("0x0aff"), Ok(vec![0x0a, 0xff]));
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }
}
