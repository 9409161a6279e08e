mod command;

use anyhow::{Context, Result, anyhow};
use command::{Command, HELP};
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use std::{env, process, thread};
use structured_blocks_config::Config;
use structured_blocks_engine::collection::inspector::{self, FormField};
use structured_blocks_engine::document::NodeData;
use structured_blocks_engine::{
    BlockInstance, ChangeEvent, Document, InstanceCollection, Presenter, RandomUids,
    StructuredEditing, Uid, ValueKind, demo,
};

/// Prints the listing and selection to stdout
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn render(
        &mut self,
        instances: &[BlockInstance],
        modified: &BTreeSet<Uid>,
        selected: Option<&Uid>,
    ) {
        println!("--- {} blocks ---", instances.len());
        print!("{}", inspector::listing(instances, modified, selected));
    }

    fn render_selection(&mut self, selected: Option<&BlockInstance>) {
        match selected {
            Some(instance) => println!("selected: #{} {}", instance.uid, instance.type_name),
            None => println!("selected: none"),
        }
    }
}

struct App {
    editing: StructuredEditing,
    collection: InstanceCollection,
    presenter: ConsolePresenter,
}

impl App {
    fn new(config: &Config) -> Result<Self> {
        let mut registry = demo::registry(RandomUids)?;
        registry.set_default_text_type(&config.default_text_block)?;
        let editing = StructuredEditing::attach(Document::new(), registry)?;

        Ok(Self {
            editing,
            collection: InstanceCollection::new(config.refresh_delay()),
            presenter: ConsolePresenter,
        })
    }

    fn open(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let events = if path.extension().is_some_and(|ext| ext == "json") {
            let payload: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("{} is not JSON", path.display()))?;
            self.editing.load(&payload)?
        } else {
            self.editing.load_markup(&content)?
        };
        log::info!("Loaded {} blocks from {}", self.editing.instances()?.len(), path.display());
        self.apply(&events)
    }

    fn apply(&mut self, events: &[ChangeEvent]) -> Result<()> {
        self.collection
            .apply_all(events, Instant::now(), &mut self.presenter)?;
        Ok(())
    }

    /// Wait out a pending refresh so the listing follows the last command
    fn settle(&mut self) {
        if let Some(deadline) = self.collection.next_refresh() {
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
            self.collection.tick(Instant::now(), &mut self.presenter);
        }
    }

    /// Run one command; returns false on quit
    fn execute(&mut self, command: Command) -> Result<bool> {
        let events = match command {
            Command::Quit => return Ok(false),
            Command::Help => {
                println!("{HELP}");
                return Ok(true);
            }
            Command::List => {
                if !self.collection.flush(&mut self.presenter) {
                    self.presenter.render(
                        self.collection.instances(),
                        self.collection.modified(),
                        self.collection.selected(),
                    );
                }
                return Ok(true);
            }
            Command::Export => {
                println!("{}", self.editing.export()?);
                return Ok(true);
            }
            Command::Fields(uid) => {
                self.print_fields(&Uid::new(uid))?;
                return Ok(true);
            }
            Command::Select(n) => {
                let uid = n
                    .checked_sub(1)
                    .and_then(|index| self.collection.instances().get(index))
                    .map(|instance| instance.uid.clone())
                    .ok_or_else(|| anyhow!("no block number {n}"))?;
                self.editing.select_block(&uid)?
            }
            Command::Insert(type_name) => self.editing.insert_default(&type_name)?,
            Command::Remove(uid) => self.editing.remove_block(&Uid::new(uid))?,
            Command::Move { uid, index } => self.editing.move_block(&Uid::new(uid), index)?,
            Command::Set {
                uid,
                property,
                value,
            } => self.set_property(&Uid::new(uid), &property, &value)?,
            Command::Type { uid, text } => self.type_text(&Uid::new(uid), &text)?,
        };
        self.apply(&events)?;
        Ok(true)
    }

    fn set_property(&mut self, uid: &Uid, property: &str, raw: &str) -> Result<Vec<ChangeEvent>> {
        let instance = self
            .collection
            .lookup(uid)
            .ok_or_else(|| anyhow!("no block #{uid}"))?;
        let spec = self
            .editing
            .registry()
            .definition(&instance.type_name)?
            .property_spec(property)
            .ok_or_else(|| anyhow!("{} has no property {property:?}", instance.type_name))?;
        let value = inspector::parse_input(&spec.kind, raw)?;
        Ok(self
            .collection
            .set_property(&mut self.editing, uid, property, value)?)
    }

    /// Append text at the end of the block's last text, or in its innermost
    /// last element when it holds no text yet
    fn type_text(&mut self, uid: &Uid, text: &str) -> Result<Vec<ChangeEvent>> {
        let block = self
            .editing
            .find_block(uid)
            .ok_or_else(|| anyhow!("no block #{uid}"))?;
        let tree = self.editing.document().tree();
        let descendants = tree.descendants(block);
        let last_text = descendants
            .iter()
            .rev()
            .find_map(|node| tree.text(*node).map(|content| (*node, content.len())));
        let last_element = descendants
            .iter()
            .rev()
            .copied()
            .find(|node| matches!(tree.data(*node), Some(NodeData::Element { .. })))
            .unwrap_or(block);

        Ok(self.editing.change(|w| match last_text {
            Some((node, end)) => w.insert_text(node, end, text),
            None => {
                let node = w.create_text(text);
                w.append(node, last_element)
            }
        })?)
    }

    fn print_fields(&self, uid: &Uid) -> Result<()> {
        let instance = self
            .collection
            .lookup(uid)
            .ok_or_else(|| anyhow!("no block #{uid}"))?;
        let definition = self.editing.registry().definition(&instance.type_name)?;
        let fields = inspector::form_fields(definition, instance);
        if fields.is_empty() {
            println!("{} has no editable properties", instance.type_name);
        }
        for FormField { name, kind, value } in fields {
            let kind = match kind {
                ValueKind::Number => "number".to_string(),
                ValueKind::Text => "text".to_string(),
                ValueKind::Enum(options) => options.join("|"),
            };
            let value = value
                .map(|value| inspector::format_value(&value.to_string()))
                .unwrap_or_default();
            println!("  {name:<10} {kind:<18} {value}");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config_path = Config::config_path();
    let config = match Config::load() {
        Ok(Some(config)) => {
            log::info!("Loaded config from {}", config_path.display());
            config
        }
        Ok(None) => Config::default(),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [DOCUMENT]", args[0]);
        process::exit(1);
    }
    let document_path = args
        .get(1)
        .map(PathBuf::from)
        .or_else(|| config.document_path.clone());

    let mut app = App::new(&config)?;
    if let Some(path) = &document_path {
        app.open(path)?;
    }
    app.settle();

    println!("Type `help` for commands.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let command = match Command::parse(&line?) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match app.execute(command) {
            Ok(true) => app.settle(),
            Ok(false) => break,
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}
