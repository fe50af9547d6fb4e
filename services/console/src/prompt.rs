//! Line-based operator prompt

use std::sync::Arc;
use swarmlink_c2_router::{CommandRelay, OperatorCommand, RelayError, TargetSelection};
use swarmlink_mesh::SendReport;
use swarmlink_unit_status::UnitDirectory;

pub const HELP: &str = "\
commands:
  units                       list discovered units
  select <unit>               bind the console to a unit
  target bound|all|<unit>...  choose where commands go
  start <behavior> [args]     start a behavior
  stop <behavior>             stop a behavior
  stop-all                    stop everything, zero motors
  deploy <behavior> [args]    deploy a behavior
  deploy-entities             push the console entity set
  log <message>               write to the unit logs
  stamp <stamp>               set the log stamp
  motors <l> <r> [limit] [offset]
  status | entities | info [unit...]
  quit";

/// Result of one prompt line
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Text for the operator
    Print(String),
    /// Operator asked to leave
    Quit,
}

pub struct Prompt {
    relay: Arc<CommandRelay>,
    selection: TargetSelection,
}

impl Prompt {
    pub fn new(relay: Arc<CommandRelay>) -> Self {
        Self {
            relay,
            selection: TargetSelection::Bound,
        }
    }

    pub fn selection(&self) -> &TargetSelection {
        &self.selection
    }

    pub async fn handle(&mut self, line: &str) -> Result<Outcome, RelayError> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        match words.next() {
            None => Ok(Outcome::Print(String::new())),
            Some("quit" | "exit") => Ok(Outcome::Quit),
            Some("help") => Ok(Outcome::Print(HELP.to_string())),
            Some("units") => Ok(Outcome::Print(self.units())),
            Some("select") => {
                let unit = words
                    .next()
                    .ok_or_else(|| RelayError::Parse("select needs a unit".into()))?;
                let bound = self.relay.select(unit)?;
                Ok(Outcome::Print(format!(
                    "bound to {}",
                    bound.label().unwrap_or_else(|| unit.to_string())
                )))
            }
            Some("target") => {
                self.selection = match words.collect::<Vec<_>>().as_slice() {
                    [] | ["bound"] => TargetSelection::Bound,
                    ["all"] => TargetSelection::All,
                    units => TargetSelection::Units(units.iter().map(|u| u.to_string()).collect()),
                };
                Ok(Outcome::Print(format!("targets: {:?}", self.selection)))
            }
            Some(_) => {
                let command: OperatorCommand = line.parse()?;
                if command.is_query() {
                    let unit = match &self.selection {
                        TargetSelection::Units(units) if units.len() == 1 => Some(units[0].as_str()),
                        _ => None,
                    };
                    let reply = self.relay.query(&command, unit).await?;
                    let text = serde_json::to_string_pretty(&reply)
                        .map_err(|e| RelayError::Parse(e.to_string()))?;
                    Ok(Outcome::Print(text))
                } else {
                    let report = self.relay.relay(&command, &self.selection).await?;
                    Ok(Outcome::Print(summarize(&command, &report)))
                }
            }
        }
    }

    fn units(&self) -> String {
        let units = self.relay.roster().units();
        if units.is_empty() {
            return "no units discovered".to_string();
        }
        units
            .iter()
            .map(|u| {
                format!(
                    "{:<12} {:<22} {:<16} {}",
                    u.unit_id,
                    u.address.as_deref().unwrap_or("-"),
                    u.status,
                    u.active_behavior.as_deref().unwrap_or("-"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn summarize(command: &OperatorCommand, report: &SendReport) -> String {
    let mut text = format!(
        "{command}: {:?} ({}/{} delivered)",
        report.status,
        report.delivered_count(),
        report.results.len()
    );
    for result in &report.results {
        text.push_str(&format!("\n  {} {:?}", result.target, result.outcome));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use swarmlink_core::entity::EntityStore;
    use swarmlink_mesh::{Binding, CommandSender};
    use swarmlink_unit_status::{UnitRoster, DEFAULT_STALE_AFTER};

    fn prompt() -> Prompt {
        Prompt::new(Arc::new(CommandRelay::new(
            CommandSender::new("console", Duration::from_millis(200)),
            Arc::new(UnitRoster::new(DEFAULT_STALE_AFTER, 10101)),
            Binding::unbound(),
            Arc::new(EntityStore::new()),
        )))
    }

    #[tokio::test]
    async fn test_target_selection() {
        let mut prompt = prompt();
        prompt.handle("target all").await.unwrap();
        assert_eq!(prompt.selection(), &TargetSelection::All);
        prompt.handle("target drone-1 drone-2").await.unwrap();
        assert_eq!(
            prompt.selection(),
            &TargetSelection::Units(vec!["drone-1".into(), "drone-2".into()])
        );
        prompt.handle("target").await.unwrap();
        assert_eq!(prompt.selection(), &TargetSelection::Bound);
    }

    #[tokio::test]
    async fn test_errors_and_quit() {
        let mut prompt = prompt();
        assert!(matches!(
            prompt.handle("stop-all").await,
            Err(RelayError::NoTargets)
        ));
        assert!(matches!(
            prompt.handle("select ghost").await,
            Err(RelayError::UnknownUnit(_))
        ));
        assert!(matches!(
            prompt.handle("dance").await,
            Err(RelayError::Parse(_))
        ));
        assert_eq!(
            prompt.handle("units").await.unwrap(),
            Outcome::Print("no units discovered".into())
        );
        assert_eq!(prompt.handle("quit").await.unwrap(), Outcome::Quit);
    }
}
