use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

pub const DEFAULT_MIN_LEAF_SIZE: u32 = 3;
pub const DEFAULT_CANVAS_SIZE: u32 = 40;
pub const DEFAULT_DENSITY: u8 = 2;

/// Parameter set posted to the generation service.
/// Field order matches the JSON the service expects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub seed: String,
    pub min_leaf_size: u32,
    pub canvas_size: u32,
    pub density: u8,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::with_seed(timestamp_seed())
    }
}

impl GenerationOptions {
    pub fn with_seed(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            min_leaf_size: DEFAULT_MIN_LEAF_SIZE,
            canvas_size: DEFAULT_CANVAS_SIZE,
            density: DEFAULT_DENSITY,
        }
    }

    /// `{seed}-{density}-{canvasSize}-{minLeafSize}.svg`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}.svg",
            self.seed, self.density, self.canvas_size, self.min_leaf_size
        )
    }

    /// Merge submitted fields over `defaults`. Blank fields keep the default.
    pub fn from_form(form: &FormData, defaults: &GenerationOptions) -> Result<Self, OptionsError> {
        for (name, _) in form.fields() {
            if !KNOWN_FIELDS.contains(&name.as_str()) {
                tracing::debug!(field = %name, "ignoring unknown form field");
            }
        }

        // The seed is sent as typed; trimming only decides whether it's blank.
        let seed = match form.get("seed") {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => defaults.seed.clone(),
        };

        let min_leaf_size =
            parse_field::<u32>(form, "minLeafSize")?.unwrap_or(defaults.min_leaf_size);
        check_min("minLeafSize", u64::from(min_leaf_size), 1)?;

        let canvas_size = parse_field::<u32>(form, "canvasSize")?.unwrap_or(defaults.canvas_size);
        check_min("canvasSize", u64::from(canvas_size), 1)?;

        let density = parse_field::<u8>(form, "density")?.unwrap_or(defaults.density);

        Ok(Self {
            seed,
            min_leaf_size,
            canvas_size,
            density,
        })
    }
}

const KNOWN_FIELDS: [&str; 4] = ["seed", "minLeafSize", "canvasSize", "density"];

fn parse_field<T: std::str::FromStr>(
    form: &FormData,
    field: &'static str,
) -> Result<Option<T>, OptionsError> {
    match form.get(field).map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| OptionsError::InvalidNumber {
                field,
                value: raw.to_string(),
            }),
    }
}

fn check_min(field: &'static str, value: u64, min: u64) -> Result<(), OptionsError> {
    if value < min {
        return Err(OptionsError::OutOfRange { field, value, min });
    }
    Ok(())
}

fn timestamp_seed() -> String {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    ms.to_string()
}

/// Ordered `(name, value)` pairs as submitted by a form.
/// Later duplicates win on lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = &(String, String)> {
        self.fields.iter()
    }

    /// Parse whitespace separated `name=value` tokens. A token without `=`
    /// is treated as a field with an empty value.
    pub fn parse_line(line: &str) -> Self {
        let mut form = Self::new();
        for token in line.split_whitespace() {
            match token.split_once('=') {
                Some((name, value)) => form.insert(name, value),
                None => form.insert(token, ""),
            }
        }
        form
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = Self::new();
        for (k, v) in iter {
            form.insert(k, v);
        }
        form
    }
}
