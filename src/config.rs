//! Command-line parsing and runtime configuration.
//!
//! The original tool takes its configuration entirely from `getopt` flags;
//! there is no separate config file the way `retina_core::config` uses one.
//! `Args` is the `clap::Parser` surface (mirroring the flag set from
//! `examples/ip_anon/src/main.rs`), and [`RuntimeConfig::from_args`] plays
//! the same validate-and-build role `retina_core::config::load_config` does
//! for its TOML file: turn user input into a value the rest of the program
//! can trust without re-checking.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;

const DEFAULT_LRU_CACHE_SIZE: usize = 10_000;
const DEFAULT_MAX_PE_FILE_SIZE_KB: u64 = 2 * 1024;
const KB: u64 = 1024;
/// BPF filter applied when `-f` is not given, matching the original's
/// `if(pcap_filter == NULL) pcap_filter = "tcp";` fallback.
pub const DEFAULT_PCAP_FILTER: &str = "tcp";

#[derive(Parser, Debug)]
#[command(
    name = "pe-sensor",
    about = "Reassembles HTTP-delivered PE payloads from captured TCP traffic"
)]
pub struct Args {
    /// Network interface to capture live traffic from.
    #[arg(short = 'i', long = "interface", value_name = "NIC")]
    pub interface: Option<String>,

    /// Read packets from an existing capture file instead of a live interface.
    #[arg(short = 'r', long = "read-file", value_name = "FILE")]
    pub pcap_file: Option<PathBuf>,

    /// Directory to write recovered PE dumps into. Required.
    #[arg(short = 'd', long = "dump-dir", value_name = "DIR")]
    pub dump_dir: PathBuf,

    /// BPF filter applied to the capture.
    #[arg(short = 'f', long = "filter", value_name = "EXPR")]
    pub pcap_filter: Option<String>,

    /// Maximum number of in-progress flows tracked at once.
    #[arg(short = 'L', long = "lru-size", value_name = "N")]
    pub lru_cache_size: Option<usize>,

    /// Maximum size, in KB, of a single reassembled PE payload.
    #[arg(short = 'K', long = "max-pe-size", value_name = "KB")]
    pub max_pe_file_size_kb: Option<u64>,

    /// Verbosity level: 1 (quiet) through 4 (very very verbose).
    #[arg(short = 'D', long = "debug", value_name = "LEVEL")]
    pub debug_level: Option<u8>,

    /// Disable client-IP anonymization (enabled by default).
    #[arg(short = 'A', long = "no-anonymize")]
    pub disable_anonymize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    Quiet = 1,
    Verbose = 2,
    VeryVerbose = 3,
    VeryVeryVerbose = 4,
}

impl DebugLevel {
    fn from_u8(level: u8) -> Self {
        match level {
            0 | 1 => DebugLevel::Quiet,
            2 => DebugLevel::Verbose,
            3 => DebugLevel::VeryVerbose,
            _ => DebugLevel::VeryVeryVerbose,
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            DebugLevel::Quiet => log::LevelFilter::Warn,
            DebugLevel::Verbose => log::LevelFilter::Info,
            DebugLevel::VeryVerbose => log::LevelFilter::Debug,
            DebugLevel::VeryVeryVerbose => log::LevelFilter::Trace,
        }
    }
}

/// Where packets are read from, validated as mutually exclusive.
#[derive(Debug, Clone)]
pub enum CaptureSource {
    Live { nic_name: String },
    Offline { pcap_file: PathBuf },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub source: CaptureSource,
    pub dump_dir: PathBuf,
    pub pcap_filter: String,
    pub lru_cache_size: usize,
    pub max_pe_file_size: usize,
    pub debug_level: DebugLevel,
    pub anonymize_src_ip: bool,
}

impl RuntimeConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        if !args.dump_dir.is_dir() {
            bail!("dump_dir {} not found", args.dump_dir.display());
        }

        let source = match (args.interface, args.pcap_file) {
            (Some(_), Some(_)) => bail!("specify either -i or -r, not both"),
            (Some(nic_name), None) => CaptureSource::Live { nic_name },
            (None, Some(pcap_file)) => CaptureSource::Offline { pcap_file },
            (None, None) => bail!("one of -i or -r must be specified"),
        };

        // Sub-minimum values are silently ignored rather than rejected,
        // matching the original's `if(atoi(optarg) > 0)` guards.
        let lru_cache_size = args
            .lru_cache_size
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_LRU_CACHE_SIZE);

        let max_pe_file_size = args
            .max_pe_file_size_kb
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_PE_FILE_SIZE_KB)
            * KB;

        let debug_level = args
            .debug_level
            .map(DebugLevel::from_u8)
            .unwrap_or(DebugLevel::Quiet);

        let pcap_filter = args
            .pcap_filter
            .unwrap_or_else(|| DEFAULT_PCAP_FILTER.to_string());

        Ok(RuntimeConfig {
            source,
            dump_dir: args.dump_dir,
            pcap_filter,
            lru_cache_size,
            max_pe_file_size: max_pe_file_size as usize,
            debug_level,
            anonymize_src_ip: !args.disable_anonymize,
        })
    }

    pub fn nic_name(&self) -> Option<&str> {
        match &self.source {
            CaptureSource::Live { nic_name } => Some(nic_name.as_str()),
            CaptureSource::Offline { .. } => None,
        }
    }

    pub fn dump_dir(&self) -> &Path {
        &self.dump_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args(dump_dir: PathBuf) -> Args {
        Args {
            interface: Some("eth0".to_string()),
            pcap_file: None,
            dump_dir,
            pcap_filter: None,
            lru_cache_size: None,
            max_pe_file_size_kb: None,
            debug_level: None,
            disable_anonymize: false,
        }
    }

    #[test]
    fn rejects_both_interface_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args(dir.path().to_path_buf());
        args.pcap_file = Some(PathBuf::from("/tmp/x.pcap"));
        assert!(RuntimeConfig::from_args(args).is_err());
    }

    #[test]
    fn rejects_neither_interface_nor_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args(dir.path().to_path_buf());
        args.interface = None;
        assert!(RuntimeConfig::from_args(args).is_err());
    }

    #[test]
    fn rejects_missing_dump_dir() {
        let args = base_args(PathBuf::from("/nonexistent/path/for/sure"));
        assert!(RuntimeConfig::from_args(args).is_err());
    }

    #[test]
    fn sub_minimum_overrides_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args(dir.path().to_path_buf());
        args.lru_cache_size = Some(0);
        args.max_pe_file_size_kb = Some(0);
        let cfg = RuntimeConfig::from_args(args).unwrap();
        assert_eq!(cfg.lru_cache_size, DEFAULT_LRU_CACHE_SIZE);
        assert_eq!(cfg.max_pe_file_size, (DEFAULT_MAX_PE_FILE_SIZE_KB * KB) as usize);
    }

    #[test]
    fn anonymize_defaults_to_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RuntimeConfig::from_args(base_args(dir.path().to_path_buf())).unwrap();
        assert!(cfg.anonymize_src_ip);
    }
}
