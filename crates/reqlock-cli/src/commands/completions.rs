use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::Write;
use std::path::Path;

/// Print the completion script for `shell`, or write it to `output`.
pub fn run<C: CommandFactory>(shell: Shell, output: Option<&Path>) -> Result<u8, String> {
    let mut cmd = C::command();
    let name = cmd.get_name().to_owned();
    let mut script = Vec::new();
    clap_complete::generate(shell, &mut cmd, name, &mut script);
    match output {
        Some(path) => {
            std::fs::write(path, &script)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            eprintln!("{shell} completions written to {}", path.display());
        }
        None => std::io::stdout()
            .write_all(&script)
            .map_err(|e| format!("failed to write completions: {e}"))?,
    }
    Ok(EXIT_SUCCESS)
}
