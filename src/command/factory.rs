//! Path suffix → command resolution.

use std::collections::HashMap;

use super::Command;

/// Command name table, built once at module initialization.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    commands: HashMap<String, Command>,
}

impl Default for CommandFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFactory {
    pub fn new() -> Self {
        let commands = [
            ("", Command::Metadata),
            ("login", Command::SignIn),
            ("acs", Command::Acs),
            ("logout", Command::Logout),
        ]
        .into_iter()
        .map(|(name, command)| (name.to_string(), command))
        .collect();

        Self { commands }
    }

    /// Look up a command by name (case-insensitive, leading '/' ignored).
    pub fn get_command(&self, name: &str) -> Command {
        let key = name.trim_start_matches('/').to_ascii_lowercase();
        self.commands
            .get(&key)
            .copied()
            .unwrap_or(Command::NotFound)
    }

    /// Resolve an app-relative path against the module path.
    ///
    /// Returns `None` when the path is outside the module path: the request
    /// is not ours and must pass through untouched.
    pub fn resolve(&self, path: &str, module_path: &str) -> Option<Command> {
        let prefix = path.get(..module_path.len())?;
        if !prefix.eq_ignore_ascii_case(module_path) {
            return None;
        }

        let command_name = &path[module_path.len()..];
        Some(self.get_command(command_name))
    }
}
