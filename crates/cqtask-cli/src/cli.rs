use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cqtask")]
#[command(about = "Continuous query tasks against an in-memory token store", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file name, extension optional
    #[arg(long, default_value = "cqtask", global = true)]
    pub config: String,

    /// Task queue capacity (overrides the config file)
    #[arg(long, global = true)]
    pub queue_capacity: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a continuous query, publish changes and print what it receives
    Watch {
        /// Equality condition, repeatable
        #[arg(long = "filter", value_name = "ATTR=VALUE", value_parser = parse_pair)]
        filters: Vec<(String, String)>,

        /// Attribute to return in results, repeatable
        #[arg(long = "return", value_name = "ATTR")]
        returning: Vec<String>,

        /// Change to publish once the query is live, as comma separated ATTR=VALUE pairs
        #[arg(long = "publish", value_name = "ATTRS")]
        publish: Vec<String>,

        /// Drop the store connection at the end instead of stopping the query
        #[arg(long)]
        disconnect: bool,
    },

    /// Print the resolved worker configuration
    Config,
}

pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ATTR=VALUE, got '{}'", raw))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing attribute name in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
