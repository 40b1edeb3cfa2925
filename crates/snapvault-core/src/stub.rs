//! In-memory host used by unit tests.
//!
//! Interprets the argument vectors built in [`crate::command`] against a small
//! model of pools, filesystems, properties and snapshots, and records every
//! call so tests can assert on what reached the host.

use crate::command::CommandRunner;
use crate::error::{SnapvaultError, SnapvaultResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct PoolState {
    imported: bool,
    properties: HashMap<String, String>,
}

#[derive(Default)]
struct HostState {
    pools: BTreeMap<String, PoolState>,
    /// dataset -> mountpoint
    filesystems: BTreeMap<String, String>,
    fs_properties: HashMap<(String, String), String>,
    /// Full snapshot names in listing order.
    snapshots: Vec<String>,
    calls: Vec<Vec<String>>,
    pipes: Vec<(Vec<String>, Vec<String>)>,
    pipe_exit: i32,
}

#[derive(Clone, Default)]
pub(crate) struct StubHost {
    state: Arc<Mutex<HostState>>,
}

fn failure(argv: &[String], stderr: impl Into<String>) -> SnapvaultError {
    SnapvaultError::CommandExecutionFailed {
        argv: argv.to_vec(),
        status: 1,
        stderr: stderr.into(),
    }
}

fn pool_of(dataset: &str) -> &str {
    dataset.split(['/', '@']).next().unwrap_or(dataset)
}

impl StubHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    /// Add a pool and its root filesystem.
    pub(crate) fn with_pool(self, name: &str, imported: bool) -> Self {
        {
            let mut state = self.state();
            state.pools.insert(
                name.to_string(),
                PoolState {
                    imported,
                    properties: HashMap::new(),
                },
            );
            state
                .filesystems
                .insert(name.to_string(), format!("/{name}"));
        }
        self
    }

    pub(crate) fn with_filesystem(self, dataset: &str) -> Self {
        self.state()
            .filesystems
            .insert(dataset.to_string(), format!("/{dataset}"));
        self
    }

    pub(crate) fn with_snapshot(self, name: &str) -> Self {
        self.state().snapshots.push(name.to_string());
        self
    }

    pub(crate) fn with_pool_property(self, pool: &str, property: &str, value: &str) -> Self {
        if let Some(state) = self.state().pools.get_mut(pool) {
            state
                .properties
                .insert(property.to_string(), value.to_string());
        }
        self
    }

    pub(crate) fn with_pipe_exit(self, code: i32) -> Self {
        self.state().pipe_exit = code;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.state().calls.clone()
    }

    /// Calls whose program and subcommand match, e.g. `("zfs", "snapshot")`.
    pub(crate) fn calls_to(&self, program: &str, subcommand: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| argv.len() > 1 && argv[0] == program && argv[1] == subcommand)
            .collect()
    }

    pub(crate) fn pipes(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.state().pipes.clone()
    }

    pub(crate) fn snapshots(&self) -> Vec<String> {
        self.state().snapshots.clone()
    }

    pub(crate) fn is_imported(&self, pool: &str) -> bool {
        self.state()
            .pools
            .get(pool)
            .map(|state| state.imported)
            .unwrap_or(false)
    }

    fn execute(&self, argv: &[String]) -> SnapvaultResult<Vec<String>> {
        let mut state = self.state();
        state.calls.push(argv.to_vec());
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();

        match args.as_slice() {
            ["zpool", "list", "-H", "-o", "name"] => Ok(state
                .pools
                .iter()
                .filter(|(_, pool)| pool.imported)
                .map(|(name, _)| name.clone())
                .collect()),
            ["zpool", "list", "-H", "-o", "name", pool] => match state.pools.get(*pool) {
                Some(entry) if entry.imported => Ok(vec![pool.to_string()]),
                _ => Err(failure(argv, format!("cannot open '{pool}': no such pool"))),
            },
            ["zpool", "import", pool] => match state.pools.get_mut(*pool) {
                Some(entry) if !entry.imported => {
                    entry.imported = true;
                    Ok(Vec::new())
                }
                Some(_) => Err(failure(argv, format!("cannot import '{pool}': a pool with that name is already created/imported"))),
                None => Err(failure(argv, format!("cannot import '{pool}': no such pool available"))),
            },
            ["zpool", "export", pool] => match state.pools.get_mut(*pool) {
                Some(entry) if entry.imported => {
                    entry.imported = false;
                    Ok(Vec::new())
                }
                _ => Err(failure(argv, format!("cannot open '{pool}': no such pool"))),
            },
            ["zpool", "get", "-H", "-o", "value", property, pool] => {
                let value = state
                    .pools
                    .get(*pool)
                    .and_then(|entry| entry.properties.get(*property))
                    .cloned()
                    .unwrap_or_else(|| "-".to_string());
                Ok(vec![value])
            }
            ["zpool", "set", assignment, pool] => {
                let (property, value) = assignment.split_once('=').unwrap_or((*assignment, ""));
                match state.pools.get_mut(*pool) {
                    Some(entry) => {
                        entry.properties.insert(property.to_string(), value.to_string());
                        Ok(Vec::new())
                    }
                    None => Err(failure(argv, format!("cannot open '{pool}': no such pool"))),
                }
            }
            ["zfs", "list", "-H", "-r", "-t", "filesystem", "-o", "name,mountpoint", pool] => {
                if !state.pools.get(*pool).is_some_and(|entry| entry.imported) {
                    return Err(failure(argv, format!("cannot open '{pool}': dataset does not exist")));
                }
                Ok(state
                    .filesystems
                    .iter()
                    .filter(|(dataset, _)| pool_of(dataset) == *pool)
                    .map(|(dataset, mount)| format!("{dataset}\t{mount}"))
                    .collect())
            }
            ["zfs", "create", dataset] => {
                if state.filesystems.contains_key(*dataset) {
                    return Err(failure(argv, format!("cannot create '{dataset}': dataset already exists")));
                }
                state
                    .filesystems
                    .insert(dataset.to_string(), format!("/{dataset}"));
                Ok(Vec::new())
            }
            ["zfs", "get", "-H", "-o", "value", property, dataset] => {
                let key = (dataset.to_string(), property.to_string());
                Ok(vec![state
                    .fs_properties
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| "-".to_string())])
            }
            ["zfs", "set", assignment, dataset] => {
                let (property, value) = assignment.split_once('=').unwrap_or((*assignment, ""));
                state
                    .fs_properties
                    .insert((dataset.to_string(), property.to_string()), value.to_string());
                Ok(Vec::new())
            }
            ["zfs", "list", "-H", "-t", "snapshot", "-o", "name"] => Ok(state.snapshots.clone()),
            ["zfs", "snapshot", name] => {
                if state.snapshots.iter().any(|existing| existing == name) {
                    return Err(failure(argv, format!("cannot create snapshot '{name}': dataset already exists")));
                }
                state.snapshots.push(name.to_string());
                Ok(Vec::new())
            }
            ["zfs", "destroy", name] => {
                let before = state.snapshots.len();
                state.snapshots.retain(|existing| existing != name);
                if state.snapshots.len() == before {
                    return Err(failure(argv, "could not find any snapshots to destroy"));
                }
                Ok(Vec::new())
            }
            ["zfs", "rename", "-r", old, new] => {
                match state.snapshots.iter_mut().find(|existing| existing.as_str() == *old) {
                    Some(existing) => {
                        *existing = new.to_string();
                        Ok(Vec::new())
                    }
                    None => Err(failure(argv, format!("cannot open '{old}': dataset does not exist"))),
                }
            }
            _ => Err(failure(argv, "unsupported command")),
        }
    }
}

impl CommandRunner for StubHost {
    fn run(&self, argv: &[String]) -> SnapvaultResult<Vec<String>> {
        self.execute(argv)
    }

    fn succeeds(&self, argv: &[String]) -> SnapvaultResult<bool> {
        match self.execute(argv) {
            Ok(_) => Ok(true),
            Err(SnapvaultError::CommandExecutionFailed { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Records the pair; a successful receive lands the sent snapshot in the target pool.
    fn pipe(&self, source: &[String], destination: &[String]) -> SnapvaultResult<i32> {
        let mut state = self.state();
        state.pipes.push((source.to_vec(), destination.to_vec()));
        let code = state.pipe_exit;
        if code != 0 {
            return Ok(code);
        }

        let (Some(sent), Some(target)) = (source.last(), destination.last()) else {
            return Ok(code);
        };
        let Some((dataset, tag)) = sent.rsplit_once('@') else {
            return Ok(code);
        };
        let received = match dataset.split_once('/') {
            Some((_, rest)) => format!("{target}/{rest}"),
            None => target.clone(),
        };
        state
            .filesystems
            .entry(received.clone())
            .or_insert_with(|| format!("/{received}"));
        state.snapshots.push(format!("{received}@{tag}"));
        Ok(code)
    }
}
