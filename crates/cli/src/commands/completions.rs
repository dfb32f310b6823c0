//! completions command - Print a shell completion script

use clap::{Args, CommandFactory};
use clap_complete::Shell;

use super::Cli;
use crate::exit_code::ExitCode;

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}

pub fn execute(args: CompletionsArgs) -> ExitCode {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(args.shell, &mut command, name, &mut std::io::stdout());
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_shell() {
        let cli = Cli::try_parse_from(["oss-tool", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            crate::commands::Commands::Completions(CompletionsArgs { shell: Shell::Bash })
        ));
    }

    #[test]
    fn test_generate_mentions_commands() {
        let mut command = Cli::command();
        let mut buffer = Vec::new();
        clap_complete::generate(Shell::Bash, &mut command, "oss-tool", &mut buffer);

        let script = String::from_utf8(buffer).unwrap();
        assert!(script.contains("upload-files"));
        assert!(script.contains("delete-floders"));
    }
}
