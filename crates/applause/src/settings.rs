//! Persistent engine settings.
//!
//! A nested key-value document (tables, numbers, booleans, strings) stored in
//! the librarian's per-user `State` location as TOML. Mutations mark the
//! document dirty; [`Settings::store`] writes it back out. The browser build
//! would flush through its virtual file system instead, behind the same
//! librarian seam.

use crate::error::{Error, ErrorKind, Result};
use crate::librarian::{Librarian, ResourceKind};
use log::*;
use toml::{Table, Value};

pub const SETTINGS_FILE: &str = "applause.toml";

fn default_document() -> Table {
    let mut root = Table::new();
    root.insert("music_volume".into(), Value::Integer(0));
    root
}

pub struct Settings {
    root: Table,
    dirty: bool,
}

impl Settings {
    /// Loads the settings document, falling back to the built-in defaults
    /// when there is none yet (first run) or it fails to parse.
    pub fn load(librarian: &Librarian) -> Self {
        let root = match librarian.read_file(ResourceKind::State, SETTINGS_FILE) {
            Ok(bytes) => match std::str::from_utf8(&bytes)
                .ok()
                .and_then(|text| text.parse::<Table>().ok())
            {
                Some(table) => table,
                None => {
                    warn!("settings file is not valid TOML, starting over");
                    default_document()
                }
            },
            Err(_) => default_document(),
        };

        Self { root, dirty: false }
    }

    pub fn empty() -> Self {
        Self {
            root: default_document(),
            dirty: false,
        }
    }

    fn group(&self, group: Option<&str>) -> Option<&Table> {
        match group {
            None => Some(&self.root),
            Some(name) => self.root.get(name)?.as_table(),
        }
    }

    /// Returns the named group, creating it if missing (upsert). A `None`
    /// group is the document root.
    pub fn find_get(&mut self, group: &str) -> &mut Table {
        let entry = self
            .root
            .entry(group.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
            self.dirty = true;
        }
        entry.as_table_mut().unwrap()
    }

    pub fn get_num(&self, group: Option<&str>, key: &str) -> Option<f64> {
        match self.group(group)?.get(key)? {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn set_num(&mut self, group: Option<&str>, key: &str, value: f64) {
        let value = if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Value::Integer(value as i64)
        } else {
            Value::Float(value)
        };
        self.set(group, key, value);
    }

    pub fn get_bool(&self, group: Option<&str>, key: &str) -> Option<bool> {
        self.group(group)?.get(key)?.as_bool()
    }

    pub fn set_bool(&mut self, group: Option<&str>, key: &str, value: bool) {
        self.set(group, key, Value::Boolean(value));
    }

    pub fn get_str(&self, group: Option<&str>, key: &str) -> Option<&str> {
        self.group(group)?.get(key)?.as_str()
    }

    pub fn set_str(&mut self, group: Option<&str>, key: &str, value: &str) {
        self.set(group, key, Value::String(value.to_string()));
    }

    fn set(&mut self, group: Option<&str>, key: &str, value: Value) {
        let table = match group {
            None => &mut self.root,
            Some(name) => self.find_get(name),
        };
        table.insert(key.to_string(), value);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the document out if anything changed since the last store.
    pub fn store(&mut self, librarian: &Librarian) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let text = self.root.to_string();
        librarian
            .write_file(ResourceKind::State, SETTINGS_FILE, text.as_bytes())
            .map_err(|_| Error::new(ErrorKind::InvalidOperation))?;
        trace!("wrote settings ({} bytes)", text.len());
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_get_set_round_trip() {
        let mut settings = Settings::empty();
        settings.set_num(None, "volume", 0.5);
        settings.set_bool(None, "fullscreen", true);
        settings.set_str(None, "name", "player one");

        assert_eq!(settings.get_num(None, "volume"), Some(0.5));
        assert_eq!(settings.get_bool(None, "fullscreen"), Some(true));
        assert_eq!(settings.get_str(None, "name"), Some("player one"));
        assert!(settings.is_dirty());
    }

    #[test]
    fn groups_upsert() {
        let mut settings = Settings::empty();
        assert!(settings.get_num(Some("window"), "width").is_none());

        settings.set_num(Some("window"), "width", 1280.0);
        settings.set_num(Some("window"), "height", 720.0);
        assert_eq!(settings.get_num(Some("window"), "width"), Some(1280.0));
        assert_eq!(settings.get_num(Some("window"), "height"), Some(720.0));

        // find_get returns the same group, not a new one
        settings.find_get("window").insert("x".into(), Value::Integer(10));
        assert_eq!(settings.get_num(Some("window"), "x"), Some(10.0));
    }

    #[test]
    fn whole_numbers_stored_as_integers() {
        let mut settings = Settings::empty();
        settings.set_num(None, "w", 1280.0);
        let text = settings.root.to_string();
        assert!(text.contains("w = 1280"), "{text}");
        assert!(!text.contains("1280.0"), "{text}");
    }
}
