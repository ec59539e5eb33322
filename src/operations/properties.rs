//! Versioned property edits.
//!
//! Each (target, property) pair is its own protected step, so a property that
//! cannot be set on one target does not stop the others.

use crate::connector::{Depth, PropertyData};
use crate::console::CommandLine;
use crate::error::Result;
use crate::messages;
use crate::operation::{Action, OperationScope};

use super::{display_all, WorkingCopy};

/// `svn propset` of every property on every target.
pub struct SetPropertiesOperation {
    targets: Vec<WorkingCopy>,
    properties: Vec<PropertyData>,
    depth: Depth,
}

impl SetPropertiesOperation {
    pub fn new(targets: Vec<WorkingCopy>, properties: Vec<PropertyData>) -> Self {
        Self {
            targets,
            properties,
            depth: Depth::Empty,
        }
    }

    #[must_use]
    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }
}

impl Action for SetPropertiesOperation {
    fn message_key(&self) -> &str {
        messages::SET_PROPERTIES
    }

    fn resources(&self) -> Vec<String> {
        display_all(&self.targets)
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            (self.targets.len() * self.properties.len()) as u64,
        );
        let console = scope.console();
        let depth = self.depth;
        for target in &self.targets {
            let label = target.display();
            for property in &self.properties {
                scope.protect_resource_step(&label, 1, |progress| {
                    progress.set_task_label(&format!("{} {}", property.name, label));
                    CommandLine::new("propset")
                        .option(&property.name, format!("\"{}\"", property.value))
                        .path(&label)
                        .flag_if(depth == Depth::Infinity, "-R")
                        .echo(console);
                    let proxy = target.location.acquire()?;
                    proxy.set_property(&label, property, depth)
                });
            }
        }
        Ok(())
    }
}

/// `svn propdel` of every named property on every target.
pub struct RemovePropertiesOperation {
    targets: Vec<WorkingCopy>,
    names: Vec<String>,
    depth: Depth,
}

impl RemovePropertiesOperation {
    pub fn new(targets: Vec<WorkingCopy>, names: Vec<String>) -> Self {
        Self {
            targets,
            names,
            depth: Depth::Empty,
        }
    }

    #[must_use]
    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }
}

impl Action for RemovePropertiesOperation {
    fn message_key(&self) -> &str {
        messages::REMOVE_PROPERTIES
    }

    fn resources(&self) -> Vec<String> {
        display_all(&self.targets)
    }

    fn execute(&mut self, scope: &mut OperationScope<'_>) -> Result<()> {
        scope.begin_task(
            &messages::operation_name(self.message_key()),
            (self.targets.len() * self.names.len()) as u64,
        );
        let console = scope.console();
        let depth = self.depth;
        for target in &self.targets {
            let label = target.display();
            for name in &self.names {
                scope.protect_resource_step(&label, 1, |progress| {
                    progress.set_task_label(&format!("{} {}", name, label));
                    CommandLine::new(&format!("propdel {}", name))
                        .path(&label)
                        .flag_if(depth == Depth::Infinity, "-R")
                        .echo(console);
                    let proxy = target.location.acquire()?;
                    proxy.remove_property(&label, name, depth)
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::MemoryConsole;
    use crate::operation::Operation;
    use crate::progress::NullProgress;
    use crate::status::ExecutionState;
    use crate::testing::memory_location;
    use std::sync::Arc;

    const ROOT: &str = "svn://host/repo";

    #[test]
    fn test_set_properties_on_every_target() {
        let (factory, location) = memory_location("main", ROOT);
        let repository = factory.repository();
        repository.add_working_copy("/wc/a", ROOT);
        let console = Arc::new(MemoryConsole::new());
        let targets = vec![
            WorkingCopy::new("/wc/a", location.clone()),
            WorkingCopy::new("/wc/gone", location),
        ];
        let properties = vec![
            PropertyData::new("svn:ignore", "target"),
            PropertyData::new("svn:eol-style", "native"),
        ];

        let mut op = Operation::new(SetPropertiesOperation::new(targets, properties))
            .with_console(console.clone());
        assert_eq!(op.run(&NullProgress::new()), ExecutionState::Error);
        assert_eq!(repository.property("/wc/a", "svn:eol-style").as_deref(), Some("native"));
        assert_eq!(repository.calls_for("propset").len(), 4);
        assert_eq!(op.errors().len(), 2);
        assert_eq!(op.failed_resources(), vec!["/wc/gone".to_string()]);
        assert_eq!(
            console.commands()[0],
            "svn propset svn:ignore \"target\" \"/wc/a\""
        );
    }

    #[test]
    fn test_remove_properties() {
        let (factory, location) = memory_location("main", ROOT);
        let repository = factory.repository();
        repository.add_working_copy("/wc/a", ROOT);
        let console = Arc::new(MemoryConsole::new());
        let targets = vec![WorkingCopy::new("/wc/a", location)];
        let mut set = Operation::new(SetPropertiesOperation::new(
            targets.clone(),
            vec![PropertyData::new("owner", "alice")],
        ));
        assert_eq!(set.run(&NullProgress::new()), ExecutionState::Ok);

        let mut remove = Operation::new(
            RemovePropertiesOperation::new(targets, vec!["owner".to_string()])
                .depth(Depth::Infinity),
        )
        .with_console(console.clone());
        assert_eq!(remove.run(&NullProgress::new()), ExecutionState::Ok);
        assert_eq!(repository.property("/wc/a", "owner"), None);
        assert_eq!(console.commands(), vec!["svn propdel owner \"/wc/a\" -R".to_string()]);
    }
}
