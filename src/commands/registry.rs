use std::collections::HashMap;

use crate::core::{Result, RouterError};

use super::RoutableCommand;

/// Lookup table from command names and aliases to routable commands.
pub struct CommandRegistry {
    commands: Vec<Box<dyn RoutableCommand>>,
    by_name: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registers `command` under its name and every alias.
    ///
    /// Fails without registering anything if one of them is already taken.
    pub fn register(&mut self, command: Box<dyn RoutableCommand>) -> Result<()> {
        let names: Vec<&'static str> = std::iter::once(command.name())
            .chain(command.aliases().iter().copied())
            .collect();
        if let Some(taken) = names.iter().find(|name| self.by_name.contains_key(*name)) {
            return Err(RouterError::BadValue(format!(
                "command '{}' is already registered",
                taken
            )));
        }
        let slot = self.commands.len();
        for name in names {
            self.by_name.insert(name, slot);
        }
        self.commands.push(command);
        Ok(())
    }

    /// Every command the router routes, under its usual names.
    pub fn with_default_commands() -> Self {
        use super::admin::{CopyDbCommand, RenameCollectionCommand};
        use super::all_shards::AllShardsCommand;
        use super::cursor::{ListCollectionsCommand, ListIndexesCommand};
        use super::distinct::DistinctCommand;
        use super::filemd5::FileMd5Command;
        use super::geo_near::GeoNearCommand;
        use super::passthrough::{CompactCommand, CreateCommand, EvalCommand};
        use super::restricted::{DisallowedOnPartitioned, GroupCommand};
        use super::rollup::{CollStatsCommand, DataSizeCommand};
        use super::validate::ValidateCommand;

        let defaults: Vec<Box<dyn RoutableCommand>> = vec![
            Box::new(CollStatsCommand),
            Box::new(DataSizeCommand),
            Box::new(DistinctCommand),
            Box::new(GeoNearCommand),
            Box::new(FileMd5Command),
            Box::new(ValidateCommand),
            Box::new(AllShardsCommand::drop_indexes()),
            Box::new(AllShardsCommand::create_indexes()),
            Box::new(AllShardsCommand::re_index()),
            Box::new(AllShardsCommand::coll_mod()),
            Box::new(DisallowedOnPartitioned::convert_to_capped()),
            Box::new(DisallowedOnPartitioned::split_vector()),
            Box::new(GroupCommand),
            Box::new(RenameCollectionCommand),
            Box::new(CopyDbCommand),
            Box::new(CreateCommand),
            Box::new(CompactCommand),
            Box::new(EvalCommand),
            Box::new(ListCollectionsCommand),
            Box::new(ListIndexesCommand),
        ];

        let mut registry = Self::new();
        for command in defaults {
            if let Err(err) = registry.register(command) {
                tracing::event!(tracing::Level::ERROR, error = %err, "default command skipped");
            }
        }
        registry
    }

    /// Resolves a command name or alias.
    pub fn find(&self, name: &str) -> Result<&dyn RoutableCommand> {
        self.by_name
            .get(name)
            .and_then(|slot| self.commands.get(*slot))
            .map(|command| command.as_ref())
            .ok_or_else(|| RouterError::CommandNotFound(name.to_string()))
    }

    /// Primary names of the registered commands, in registration order.
    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_default_commands()
    }
}
