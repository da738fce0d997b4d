use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use lazy_static::lazy_static;

use crate::command::descriptor::Command;
use crate::context::ServiceConfig;
use crate::core::Document;

/// The process-wide lookup table from command name or alias to its
/// descriptor.
///
/// Registration happens during the single-threaded startup phase and is
/// fatal on any collision; descriptors are leaked so that lookups can hand
/// out `&'static` references for the rest of the process lifetime. After
/// startup the map is read-only, so lookups take the uncontended read path.
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, &'static dyn Command>>,
    unknowns: AtomicU64,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            unknowns: AtomicU64::new(0),
        }
    }

    /// Registers a command under its canonical name and every alias.
    ///
    /// Panics on a name collision or on a descriptor that violates its own
    /// invariants; both are startup bugs that must fail the process before
    /// it serves traffic.
    pub fn register(&self, command: Box<dyn Command>) -> &'static dyn Command {
        let command: &'static dyn Command = Box::leak(command);

        assert!(
            !command.local_host_only_if_no_auth() || command.admin_only(),
            "command '{}' is localhost-only but not admin-only",
            command.name()
        );
        assert!(
            command
                .deprecated_api_versions()
                .is_subset(command.api_versions()),
            "command '{}' is deprecated in an API version it does not support",
            command.name()
        );

        let mut map = self
            .commands
            .write()
            .expect("command registry lock poisoned");
        let names = std::iter::once(command.name()).chain(command.aliases().iter().copied());
        for name in names {
            if map.insert(name.to_string(), command).is_some() {
                panic!("command '{}' registered twice", name);
            }
        }
        log::debug!("registered command '{}'", command.name());
        command
    }

    /// Registers a command only when test commands are enabled.
    pub fn register_test_command(
        &self,
        config: &ServiceConfig,
        command: Box<dyn Command>,
    ) -> Option<&'static dyn Command> {
        if config.test_commands_enabled {
            Some(self.register(command))
        } else {
            None
        }
    }

    /// Looks a command up by canonical name or alias. Never fails; an
    /// unknown name is simply absent.
    pub fn find_command(&self, name: &str) -> Option<&'static dyn Command> {
        self.commands
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
    }

    /// Accounts a lookup for a name no command answers to. Distinct from
    /// any command's own counters.
    pub fn increment_unknown_commands(&self) {
        self.unknowns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_commands(&self) -> u64 {
        self.unknowns.load(Ordering::Relaxed)
    }

    /// Canonical names of all registered commands, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let map = self.commands.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = map
            .values()
            .map(|command| command.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// The per-command counter section of a server-status report.
    pub fn report_metrics(&self) -> Document {
        let map = self.commands.read().unwrap_or_else(|e| e.into_inner());
        let mut seen: Vec<(&str, &'static dyn Command)> = map
            .values()
            .map(|command| (command.name(), *command))
            .collect();
        seen.sort_by_key(|(name, _)| *name);
        seen.dedup_by_key(|(name, _)| *name);

        let mut report = Document::new();
        for (name, command) in seen {
            let metrics = command.metrics();
            report.append(
                name,
                Document::new()
                    .with("total", metrics.executed())
                    .with("failed", metrics.failed())
                    .into_value(),
            );
        }
        report.append("<UNKNOWN>", self.unknown_commands());
        report
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: CommandRegistry = CommandRegistry::new();
}

/// The process-wide registry, lazily constructed on first access and alive
/// until process exit. Prefer passing a registry reference into the
/// pipeline; this accessor exists for the common single-registry server.
pub fn global_registry() -> &'static CommandRegistry {
    &GLOBAL_REGISTRY
}
