use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Turn a screen recording into a handover document
#[derive(Parser, Debug)]
#[command(
    name = "hikitsugi",
    about = "Turn a screen recording into a handover document",
    version,
    author,
    long_about = "hikitsugi uploads a recording of a business task to the handover server, \
                  follows its processing live, asks a few scoping questions and downloads \
                  the generated handover document."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Upload a recording and produce its handover document",
        long_about = "Uploads the recording, follows processing, asks the scoping questions \
                      on the terminal and prints the generated document.\n\n\
                      Examples:\n  \
                      hikitsugi run meeting.mp4\n  \
                      hikitsugi run meeting.mp4 --title \"月次請求\" --author 佐藤\n  \
                      hikitsugi run meeting.mp4 --format json --output handover.json"
    )]
    Run(RunArgs),

    #[command(about = "Show the server-side status of a session")]
    Status(StatusArgs),

    #[command(about = "Download the stored document of a finished session")]
    Document(DocumentArgs),

    #[command(about = "List the scoping questions")]
    Questions(QuestionsArgs),

    #[command(about = "Show the effective configuration")]
    Config(ConfigArgs),
}

/// Options shared by every command that talks to the server
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    #[arg(long, value_name = "URL", help = "Server base URL (overrides HIKITSUGI_SERVER_URL)")]
    pub server: Option<String>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Request timeout in seconds (overrides HIKITSUGI_REQUEST_TIMEOUT)"
    )]
    pub timeout: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "FILE", help = "Recording to upload")]
    pub file: PathBuf,

    #[arg(long, value_name = "ID", help = "Session id (a new UUID by default)")]
    pub session_id: Option<String>,

    #[arg(long, value_name = "TEXT", default_value = "", help = "Business title")]
    pub title: String,

    #[arg(long, value_name = "NAME", default_value = "", help = "Author name")]
    pub author: String,

    #[arg(long, value_name = "TEXT", default_value = "", help = "Additional notes")]
    pub notes: String,

    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(value_name = "SESSION_ID")]
    pub session_id: String,

    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct DocumentArgs {
    #[arg(value_name = "SESSION_ID")]
    pub session_id: String,

    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the document to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct QuestionsArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
