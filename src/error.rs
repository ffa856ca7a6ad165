use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
    #[display("missing required setting: {name}")]
    Missing { name: String },
}

#[derive(Debug, Display, Error)]
pub enum ProviderError {
    #[display("failed to build {provider} client")]
    Client { provider: String },
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
    #[display("No historical rows")]
    NoData,
    #[display("ambiguous close table: {columns:?}")]
    AmbiguousTable { columns: Vec<String> },
}

#[derive(Debug, Display, Error)]
pub enum NormalizeError {
    #[display("No valid candles")]
    NoValidCandles,
}

#[derive(Debug, Display, Error)]
pub enum QuoteError {
    #[display("No close prices")]
    NoCloses,
    #[display("Invalid current price")]
    InvalidPrice,
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum RelayError {
    #[display("failed to build relay client")]
    Client,
    #[display("ingest transport failed")]
    Transport,
    #[display("ingest rejected with status {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Display, Error)]
pub enum CommandError {
    #[display("{message}")]
    Usage { message: String },
    #[display("{message}")]
    Failed { message: String },
}
