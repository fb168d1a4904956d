use crate::config::{PullPolicy, Settings};
use crate::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sslcount")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Count SSL_read calls per process with eBPF uprobes", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "YAML settings file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Executable or shared library to instrument")]
    pub executable: Option<PathBuf>,

    #[arg(short, long, help = "Symbol to instrument")]
    pub symbol: Option<String>,

    #[arg(
        long,
        help = "Agent endpoint for delegated loading (unix:<path> or http://host:port)"
    )]
    pub agent: Option<String>,

    #[arg(long, conflicts_with = "image", help = "Bytecode file for delegated loading")]
    pub file: Option<PathBuf>,

    #[arg(long, help = "Bytecode OCI image for delegated loading")]
    pub image: Option<String>,

    #[arg(long, value_enum, help = "When the agent pulls --image")]
    pub pull_policy: Option<PullPolicy>,
}

impl Cli {
    /// Settings from `--config` (if any) with command-line flags on top.
    pub fn settings(&self) -> Result<Settings> {
        let base = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        Ok(base.merge(Settings {
            executable: self.executable.clone(),
            symbol: self.symbol.clone(),
            agent: self.agent.clone(),
            bytecode_file: self.file.clone(),
            bytecode_image: self.image.clone(),
            image_pull_policy: self.pull_policy,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BytecodeSource;

    #[test]
    fn test_flags_become_settings() {
        let cli = Cli::parse_from([
            "sslcount",
            "--executable",
            "/usr/lib/libssl.so.3",
            "--image",
            "quay.io/example/probe:v1",
            "--pull-policy",
            "never",
        ]);

        let settings = cli.settings().unwrap();

        assert_eq!(
            settings.target().executable(),
            std::path::Path::new("/usr/lib/libssl.so.3")
        );
        assert_eq!(settings.target().symbol(), "SSL_read");
        assert_eq!(
            settings.bytecode(),
            BytecodeSource::Image {
                url: "quay.io/example/probe:v1".to_string(),
                pull_policy: PullPolicy::Never,
            }
        );
    }

    #[test]
    fn test_file_and_image_conflict() {
        let result = Cli::try_parse_from(["sslcount", "--file", "a.o", "--image", "quay.io/a"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_file_flag_wins_over_image_in_settings_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bytecode_image: quay.io/a/b:v1").unwrap();
        let config = file.path().to_str().unwrap();

        let cli = Cli::parse_from(["sslcount", "--config", config, "--file", "/opt/cli.o"]);

        assert_eq!(
            cli.settings().unwrap().bytecode(),
            BytecodeSource::File(std::path::PathBuf::from("/opt/cli.o"))
        );
    }
}
