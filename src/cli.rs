//! Command-line argument parsing for Zeus.
//!
//! `serve` runs the HTTP API. The other subcommands are thin clients of a
//! running server.

use crate::client::DEFAULT_SERVER_URL;
use crate::error::{Result, ZeusError};
use crate::output::OutputFormat;
use crate::query::ExecuteRequest;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Submit SQL to Athena, track runs, page through and export results.
#[derive(Parser, Debug)]
#[command(name = "zeus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write logs to a file instead of stderr (default location if no PATH)
    #[arg(long, global = true, value_name = "PATH", num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,

    /// URL of a running Zeus server
    #[arg(
        long,
        global = true,
        env = "ZEUS_SERVER",
        value_name = "URL",
        default_value = DEFAULT_SERVER_URL
    )]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides config)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short = 'p', long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Execute SQL ad hoc, or a saved query with --query
    Execute(ExecuteArgs),

    /// List the runs of a saved query, refreshing unfinished ones
    Runs {
        /// Saved query ID
        #[arg(value_name = "QUERY_ID")]
        query_id: String,

        /// Output format (text or json)
        #[arg(long, value_name = "FORMAT", default_value = "text")]
        format: OutputFormat,
    },

    /// Show a page of results, or the current status if not finished
    Results {
        #[arg(value_name = "EXECUTION_ID")]
        execution_id: String,

        /// 1-indexed page number
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Rows per page
        #[arg(long, default_value_t = 50)]
        size: i64,

        /// Output format (text or json)
        #[arg(long, value_name = "FORMAT", default_value = "text")]
        format: OutputFormat,
    },

    /// Download the full result set as CSV
    Export {
        #[arg(value_name = "EXECUTION_ID")]
        execution_id: String,

        /// Write to this file instead of stdout
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ExecuteArgs {
    /// SQL text
    #[arg(long, value_name = "SQL", conflicts_with = "file")]
    pub sql: Option<String>,

    /// Read SQL from a file
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Parameter value for a {{name}} placeholder (repeatable)
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Execute this saved query instead of ad-hoc SQL
    #[arg(long, value_name = "QUERY_ID")]
    pub query: Option<String>,
}

/// Parses `name=value`. The value may itself contain `=`.
fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{s}'. Expected NAME=VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Invalid parameter '{s}'. Name is empty"));
    }
    Ok((name.to_string(), value.to_string()))
}

impl ExecuteArgs {
    /// Builds the request body, reading SQL from `--file` if given.
    pub fn to_request(&self) -> Result<ExecuteRequest> {
        let sql = match (&self.sql, &self.file) {
            (Some(sql), _) => Some(sql.clone()),
            (None, Some(path)) => Some(std::fs::read_to_string(path).map_err(|e| {
                ZeusError::validation(format!("Failed to read {}: {e}", path.display()))
            })?),
            (None, None) => None,
        };

        if sql.is_none() && self.query.is_none() {
            return Err(ZeusError::validation(
                "Provide --sql, --file, or --query to execute",
            ));
        }

        let parameters: BTreeMap<String, String> = self.params.iter().cloned().collect();
        Ok(ExecuteRequest { sql, parameters })
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the log file to write to, or `None` for stderr.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(crate::logging::default_log_path))
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }
}
