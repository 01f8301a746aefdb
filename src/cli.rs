use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Import and export search-index collections with their mappings")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,

    /// Quiet mode, suppress progress output
    #[clap(long, global = true)]
    pub quiet: bool,

    /// Debug mode, enable verbose logging
    #[clap(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Export an index to a newline-delimited JSON file
    Export {
        /// Elasticsearch host to export from (http://host:port/)
        #[clap(long("source-url"), required = true)]
        source_url: String,

        /// Elasticsearch index to export
        #[clap(long("source-index"), required = true)]
        source_index: String,

        /// File path to save the export to, stdout if omitted (use a '.gz' suffix to gzip the data)
        #[clap(long("dest-file"))]
        dest_file: Option<PathBuf>,

        /// Index time field to filter the exported data on
        #[clap(long("time-field"))]
        time_field: Option<String>,

        /// Exclusive start of the time window (format: YYYY.MM.DD HH:MM:SS)
        #[clap(long("time-start"))]
        time_start: Option<String>,

        /// Inclusive end of the time window (format: YYYY.MM.DD HH:MM:SS)
        #[clap(long("time-end"))]
        time_end: Option<String>,

        /// Overwrite the destination file if it exists
        #[clap(long)]
        overwrite: bool,

        /// Number of documents to scroll per page
        #[clap(long, default_value = "10000")]
        limit: i64,

        /// Username for basic auth (overrides username in --source-url)
        #[clap(long)]
        username: Option<String>,

        /// Password for basic auth (overrides password in --source-url)
        #[clap(long)]
        password: Option<String>,
    },

    /// Import a previously exported index (the schema companion must sit next to the data file)
    Import {
        /// File path of the exported index (a '.gz' suffix is gunzipped first)
        #[clap(long("source-file"), required = true)]
        source_file: PathBuf,

        /// Elasticsearch host to import the index to (http://host:port/)
        #[clap(long("dest-url"), required = true)]
        dest_url: String,

        /// Elasticsearch index to import into; must not exist yet
        #[clap(long("dest-index"), required = true)]
        dest_index: String,

        /// Username for basic auth (overrides username in --dest-url)
        #[clap(long)]
        username: Option<String>,

        /// Password for basic auth (overrides password in --dest-url)
        #[clap(long)]
        password: Option<String>,
    },

    /// Copy an index between two hosts, schema first
    Copy {
        /// Elasticsearch host to copy from (http://host:port/)
        #[clap(long("source-url"), required = true)]
        source_url: String,

        /// Elasticsearch index to copy
        #[clap(long("source-index"), required = true)]
        source_index: String,

        /// Elasticsearch host to copy to (http://host:port/)
        #[clap(long("dest-url"), required = true)]
        dest_url: String,

        /// Destination index; must not exist yet
        #[clap(long("dest-index"), required = true)]
        dest_index: String,

        /// Index time field to filter the copied data on
        #[clap(long("time-field"))]
        time_field: Option<String>,

        /// Exclusive start of the time window (format: YYYY.MM.DD HH:MM:SS)
        #[clap(long("time-start"))]
        time_start: Option<String>,

        /// Inclusive end of the time window (format: YYYY.MM.DD HH:MM:SS)
        #[clap(long("time-end"))]
        time_end: Option<String>,

        /// Number of documents to scroll per page
        #[clap(long, default_value = "10000")]
        limit: i64,

        /// Username for basic auth, applied to both hosts (overrides URL credentials)
        #[clap(long)]
        username: Option<String>,

        /// Password for basic auth, applied to both hosts (overrides URL credentials)
        #[clap(long)]
        password: Option<String>,
    },
}
