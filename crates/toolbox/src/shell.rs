//! Line-oriented command shell standing in for the host page.
//!
//! Each stdin line is one command:
//! `key <key> [ctrl|alt|meta|shift...]`, `click <module>`, `nav <path>`,
//! `set <module> <setting> <json>`, `bind <module>`, `list`,
//! `move <x> <y> <width> <height>`, `page <json-file>` and `quit`.

use std::{fs, path::PathBuf, result::Result as StdResult, str::FromStr};

use config::{SettingValue, TriggerType, UNBOUND};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use toolbox_engine::{
    Engine, KeyEvent, KeyOutcome, Position, SharedLocation, Trigger, Viewport,
};
use toolbox_modules::{PageDocument, StaticPage};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const USAGE: &str = "commands: key <key> [mods..] | click <module> | nav <path> | \
                     set <module> <setting> <json> | bind <module> | list | \
                     move <x> <y> <w> <h> | page <file> | quit";

/// One parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Key(KeyEvent),
    Click(String),
    Nav(String),
    Set {
        module: String,
        setting: String,
        value: SettingValue,
    },
    Bind(String),
    List,
    /// Drag the panel to a point inside a viewport of the given size.
    Move {
        to: Position,
        viewport: Viewport,
    },
    Page(PathBuf),
    Quit,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let rest: Vec<&str> = words.collect();
        let one = |what: &str| match rest.as_slice() {
            [arg] => Ok((*arg).to_string()),
            _ => Err(Error::command(format!("{verb} takes one {what}"))),
        };
        match verb {
            "key" => {
                let Some((key, mods)) = rest.split_first() else {
                    return Err(Error::command("key needs a key name"));
                };
                let chord: Vec<&str> = mods.iter().chain([key]).copied().collect();
                chord
                    .join("+")
                    .parse()
                    .map(Self::Key)
                    .map_err(|e| Error::command(format!("{e}")))
            }
            "click" => one("module id").map(Self::Click),
            "nav" => one("path").map(Self::Nav),
            "set" => {
                let [module, setting, json @ ..] = rest.as_slice() else {
                    return Err(Error::command("set <module> <setting> <json>"));
                };
                let raw: Value = serde_json::from_str(&json.join(" "))?;
                let value = SettingValue::from_json(&raw).ok_or_else(|| {
                    Error::command("setting values are booleans, numbers or strings")
                })?;
                Ok(Self::Set {
                    module: (*module).to_string(),
                    setting: (*setting).to_string(),
                    value,
                })
            }
            "bind" => one("module id").map(Self::Bind),
            "list" => Ok(Self::List),
            "move" => {
                let nums = rest
                    .iter()
                    .map(|w| w.parse::<f64>())
                    .collect::<StdResult<Vec<_>, _>>()
                    .map_err(|e| Error::command(format!("move: {e}")))?;
                let [x, y, width, height] = nums.as_slice() else {
                    return Err(Error::command("move <x> <y> <width> <height>"));
                };
                Ok(Self::Move {
                    to: Position { x: *x, y: *y },
                    viewport: Viewport {
                        width: *width,
                        height: *height,
                    },
                })
            }
            "page" => one("file").map(|p| Self::Page(PathBuf::from(p))),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(Error::command(format!("unknown command {other:?}; {USAGE}"))),
        }
    }
}

fn describe(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Fired(id) => format!("fired {id}"),
        Trigger::Toggled { module, active } => {
            format!("{module} {}", if *active { "on" } else { "off" })
        }
    }
}

/// Drives an engine from text commands.
pub struct Shell {
    engine: Engine,
    location: SharedLocation,
    page: StaticPage,
}

impl Shell {
    pub fn new(engine: Engine, location: SharedLocation, page: StaticPage) -> Self {
        Self {
            engine,
            location,
            page,
        }
    }

    /// Execute one command, returning its output lines. `None` means quit.
    pub fn execute(&self, command: Command) -> Result<Option<Vec<String>>> {
        debug!(?command, "shell command");
        let out = match command {
            Command::Key(event) => match self.engine.on_key_event(&event) {
                KeyOutcome::Ignored => vec!["ignored".to_string()],
                KeyOutcome::UiToggled { visible } => {
                    vec![format!("panel {}", if visible { "shown" } else { "hidden" })]
                }
                KeyOutcome::Captured(result) => vec![match result.binding() {
                    Some(key) => format!("{} bound to {key}", result.target().module),
                    None => format!("{} binding unchanged", result.target().module),
                }],
                KeyOutcome::Dispatched(triggers) => triggers.iter().map(describe).collect(),
            },
            Command::Click(id) => vec![describe(&self.engine.on_click(&id)?)],
            Command::Nav(path) => {
                self.location.navigate(&path);
                vec![format!("at {path}")]
            }
            Command::Set {
                module,
                setting,
                value,
            } => {
                self.engine.update_setting(&module, &setting, value)?;
                vec![format!("{module}.{setting} updated")]
            }
            Command::Bind(module) => {
                let setting = self
                    .engine
                    .modules()
                    .into_iter()
                    .find(|m| m.id == module)
                    .and_then(|m| m.binding_setting().map(|s| s.id.clone()))
                    .ok_or_else(|| Error::command(format!("{module} has no key binding")))?;
                self.engine.begin_capture(&module, &setting);
                vec![format!("press a key for {module} (Escape cancels)")]
            }
            Command::List => self.list(),
            Command::Move { to, viewport } => {
                let at = self.engine.ui().move_panel(to, viewport);
                vec![format!("panel at {},{}", at.x, at.y)]
            }
            Command::Page(path) => {
                let raw = fs::read_to_string(&path)?;
                let doc: PageDocument = serde_json::from_str(&raw)?;
                let count = doc.elements.len();
                self.page.replace(doc);
                vec![format!("page loaded ({count} elements)")]
            }
            Command::Quit => return Ok(None),
        };
        Ok(Some(out))
    }

    /// Modules visible on the current page, one per line.
    fn list(&self) -> Vec<String> {
        let modules = self.engine.visible_modules();
        if modules.is_empty() {
            return vec![format!("no modules at {}", self.engine.location().path)];
        }
        modules
            .iter()
            .map(|m| {
                let binding = self
                    .engine
                    .settings(&m.id)
                    .and_then(|s| s.binding().map(str::to_string))
                    .unwrap_or_else(|| UNBOUND.to_string());
                let state = match m.trigger {
                    TriggerType::FireOnce => "",
                    TriggerType::Continuous if self.engine.is_active(&m.id) => " [on]",
                    TriggerType::Continuous => " [off]",
                };
                format!("{:<24} {:<8} {}{}", m.id, binding, m.label, state)
            })
            .collect()
    }

    /// Read commands until end of input or `quit`.
    pub async fn run<R>(&self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let result = line.parse().and_then(|cmd| self.execute(cmd));
            match result {
                Ok(Some(out)) => {
                    for l in out {
                        println!("{l}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(line, error = %e, "command failed");
                    println!("error: {e}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, sync::Arc};

    use async_trait::async_trait;
    use config::MemoryStorage;
    use tempfile::NamedTempFile;
    use toolbox_engine::{Modifiers, test_support::test_engine_with};
    use toolbox_modules::{
        Element, Error as FetchError, RemoteFetch, Services, WorkspaceStore, default_registry,
    };

    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            "key t alt".parse::<Command>().unwrap(),
            Command::Key(KeyEvent::with_modifiers("t", Modifiers::ALT))
        );
        assert_eq!(
            "key q".parse::<Command>().unwrap(),
            Command::Key(KeyEvent::plain("q"))
        );
        assert_eq!(
            "nav /workspace/gpt".parse::<Command>().unwrap(),
            Command::Nav("/workspace/gpt".into())
        );
        assert_eq!(
            "set queue_gpt_v2 mode \"all\"".parse::<Command>().unwrap(),
            Command::Set {
                module: "queue_gpt_v2".into(),
                setting: "mode".into(),
                value: "all".into(),
            }
        );
        assert_eq!("list".parse::<Command>().unwrap(), Command::List);
        assert_eq!(
            "move 40 -3.5 1280 800".parse::<Command>().unwrap(),
            Command::Move {
                to: Position { x: 40.0, y: -3.5 },
                viewport: Viewport {
                    width: 1280.0,
                    height: 800.0,
                },
            }
        );
        assert!("move 1 2 3".parse::<Command>().is_err());
        assert!("move a 2 3 4".parse::<Command>().is_err());
        assert!("set a b [1]".parse::<Command>().is_err());
        assert!("click".parse::<Command>().is_err());
        assert!("jump".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn executes_against_engine() {
        let page = StaticPage::default();
        let storage = Arc::new(MemoryStorage::new());
        let services = Services {
            page: Arc::new(page.clone()),
            fetch: Arc::new(NoFetch),
            workspace: Arc::new(WorkspaceStore::new(storage.clone())),
        };
        let t = test_engine_with(default_registry(&services), "/workspace/gpt", storage).unwrap();
        let shell = Shell::new(t.engine.clone(), t.location.clone(), page);

        let listed = shell.execute(Command::List).unwrap().unwrap();
        assert!(listed.iter().any(|l| l.starts_with("auto_retry") && l.ends_with("[off]")));

        shell.execute("bind clear_queue".parse().unwrap()).unwrap();
        let out = shell.execute("key c".parse().unwrap()).unwrap().unwrap();
        assert_eq!(out, vec!["clear_queue bound to c"]);

        assert!(shell.execute("bind no_such_module".parse().unwrap()).is_err());

        let out = shell.execute("click auto_retry".parse().unwrap()).unwrap().unwrap();
        assert_eq!(out, vec!["auto_retry on"]);

        let out = shell
            .execute("move 5000 5000 1280 800".parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(out, vec!["panel at 960,280"]);
        assert_eq!(t.engine.ui().position(), Position { x: 960.0, y: 280.0 });

        shell.execute("nav /novel".parse().unwrap()).unwrap();
        assert!(shell.execute("click auto_retry".parse().unwrap()).is_err());

        let mut file = NamedTempFile::new().unwrap();
        let doc = PageDocument {
            title: "t".into(),
            search: String::new(),
            elements: vec![Element::new("button", "启动")],
        };
        write!(file, "{}", serde_json::to_string(&doc).unwrap()).unwrap();
        let out = shell
            .execute(Command::Page(file.path().to_path_buf()))
            .unwrap()
            .unwrap();
        assert_eq!(out, vec!["page loaded (1 elements)"]);

        assert_eq!(shell.execute(Command::Quit).unwrap(), None);
        t.engine.teardown().await;
    }

    struct NoFetch;

    #[async_trait]
    impl RemoteFetch for NoFetch {
        async fn get_json(&self, url: &str, _: bool) -> toolbox_modules::Result<Value> {
            Err(FetchError::Fetch {
                url: url.into(),
                message: "offline".into(),
            })
        }
    }
}
