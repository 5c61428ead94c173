use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::error::SearchError;
use crate::matcher::{MatchOptions, Number, NumberMatchMode, Search, TextMatchMode};

#[derive(Debug, Clone, Parser)]
#[command(name = "class-search")]
#[command(about = "Search compiled Java classes and resources for text, numbers, references and declarations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Jar, zip, directory or .class file to load; repeatable.
    #[arg(short = 'i', long = "input", value_name = "PATH", global = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub ignore_case: bool,

    /// Treat floating-point values within EPS of each other as equal.
    #[arg(long, value_name = "EPS", global = true)]
    pub float_tolerance: Option<f64>,

    /// Fail to load classes whose InnerClasses data names the class as its own outer class.
    #[arg(long, global = true)]
    pub reject_self_enclosure: bool,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// -v info, -vv debug, -vvv trace.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Match names, descriptors, string constants and resource text.
    Text {
        query: String,

        #[arg(short = 'm', long, value_enum, default_value_t = TextMatchMode::Contains)]
        mode: TextMatchMode,
    },
    /// Match numeric constants.
    Number {
        #[arg(allow_hyphen_values = true)]
        value: String,

        #[arg(short = 'm', long, value_enum, default_value_t = NumberMatchMode::Equals)]
        mode: NumberMatchMode,
    },
    /// Match instructions and headers that refer to a class, field or method.
    Reference(MemberArgs),
    /// Match class, field and method declarations.
    Declaration(MemberArgs),
    /// Print the structure and nesting of one class.
    Outline { class_name: String },
    Stats,
}

#[derive(Debug, Clone, Args)]
pub struct MemberArgs {
    #[arg(long, value_name = "CLASS")]
    pub owner: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, value_name = "DESC")]
    pub descriptor: Option<String>,

    #[arg(short = 'm', long, value_enum, default_value_t = TextMatchMode::Equals)]
    pub mode: TextMatchMode,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

impl Commands {
    /// The search this command runs, or `None` for non-search commands.
    pub fn search(&self, options: MatchOptions) -> Result<Option<Search>, SearchError> {
        let search = Search::with_options(options);
        let search = match self {
            Commands::Text { query, mode } => search.text(query, *mode)?,
            Commands::Number { value, mode } => search.number(Number::parse(value)?, *mode),
            Commands::Reference(m) => search.reference(
                owner_name(m).as_deref(),
                m.name.as_deref(),
                m.descriptor.as_deref(),
                m.mode,
            )?,
            Commands::Declaration(m) => search.declaration(
                owner_name(m).as_deref(),
                m.name.as_deref(),
                m.descriptor.as_deref(),
                m.mode,
            )?,
            Commands::Outline { .. } | Commands::Stats => return Ok(None),
        };
        Ok(Some(search))
    }
}

/// Accepts `java.lang.String` as well as `java/lang/String`.
pub fn normalize_class_name(name: &str) -> String {
    name.trim().trim_end_matches(".class").replace('.', "/")
}

/// Regex owners are taken as written.
fn owner_name(args: &MemberArgs) -> Option<String> {
    match args.mode {
        TextMatchMode::Regex => args.owner.clone(),
        _ => args.owner.as_deref().map(normalize_class_name),
    }
}
