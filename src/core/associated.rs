//! Associated file resolution.
//!
//! Sidecars (`.xmp`, `.thm`, `.aae`), live-photo pairs and custom-pattern
//! matches travel with their main file. Claiming happens in discovery order,
//! only within one source folder, and each file is claimed at most once.

use crate::models::preset::AssociatedFileRules;
use crate::models::record::FileRecord;
use crate::Result;
use regex::{Captures, Regex, RegexBuilder};
use std::collections::HashMap;
use std::path::Path;

/// Groups main files with their associated files.
#[derive(Debug, Clone)]
pub struct AssociatedFileResolver {
    rules: AssociatedFileRules,
    custom: Vec<(Regex, String)>,
    placeholder: Regex,
}

impl AssociatedFileResolver {
    /// Create a new resolver for `rules`.
    pub fn new(rules: AssociatedFileRules) -> Result<Self> {
        let custom = rules
            .custom_patterns
            .iter()
            .map(|p| -> Result<(Regex, String)> {
                let main = RegexBuilder::new(&format!("^(?:{})$", p.main))
                    .case_insensitive(true)
                    .build()?;
                Ok((main, p.associated.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            custom,
            placeholder: Regex::new(r"\$(?:(\d+)|\{(\w+)\})")?,
        })
    }

    /// Files of `pool` that `main` would claim, ignoring claims already made.
    pub fn find_associated<'a>(&self, main: &FileRecord, pool: &'a [FileRecord]) -> Vec<&'a FileRecord> {
        if !self.rules.enabled {
            return Vec::new();
        }
        let custom = self.custom_matchers(main);
        pool.iter()
            .filter(|c| c.id != main.id && c.source_dir() == main.source_dir())
            .filter(|c| self.matches(main, c, &custom))
            .collect()
    }

    /// Attach associated files to their main file.
    ///
    /// Returns the top-level records in discovery order. A record that owns
    /// associated files is never claimed itself.
    pub fn resolve(&self, records: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        if !self.rules.enabled || records.len() < 2 {
            return Ok(records);
        }

        let mut folders: HashMap<&Path, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            folders.entry(record.source_dir()).or_default().push(i);
        }

        let mut owner: Vec<Option<usize>> = vec![None; records.len()];
        let mut owns = vec![false; records.len()];

        for i in 0..records.len() {
            if owner[i].is_some() {
                continue;
            }
            let main = &records[i];
            let custom = self.custom_matchers(main);
            let Some(siblings) = folders.get(main.source_dir()) else {
                continue;
            };
            for &j in siblings {
                if j == i || owner[j].is_some() || owns[j] {
                    continue;
                }
                if self.matches(main, &records[j], &custom) {
                    tracing::debug!(
                        "Associated {} with {}",
                        records[j].original_filename,
                        main.original_filename
                    );
                    owner[j] = Some(i);
                    owns[i] = true;
                }
            }
        }
        drop(folders);

        let mut slots: Vec<Option<FileRecord>> = records.into_iter().map(Some).collect();
        let mut top: Vec<(usize, FileRecord)> = Vec::new();
        let mut children: HashMap<usize, Vec<FileRecord>> = HashMap::new();

        for (i, slot) in slots.iter_mut().enumerate() {
            let Some(record) = slot.take() else { continue };
            match owner[i] {
                Some(parent) => children.entry(parent).or_default().push(record),
                None => top.push((i, record)),
            }
        }

        let mut result = Vec::with_capacity(top.len());
        for (i, mut record) in top {
            for child in children.remove(&i).unwrap_or_default() {
                record.add_associated(child)?;
            }
            result.push(record);
        }
        Ok(result)
    }

    fn matches(&self, main: &FileRecord, candidate: &FileRecord, custom: &[Regex]) -> bool {
        let same_base = main.base_name.eq_ignore_ascii_case(&candidate.base_name);
        let main_is_sidecar = main.has_extension_in(&self.rules.same_base_name);

        if same_base && !main_is_sidecar && candidate.has_extension_in(&self.rules.same_base_name) {
            return true;
        }
        if same_base
            && main.has_extension_in(&self.rules.video_extensions)
            && candidate.has_extension_in(&self.rules.video_to_image)
        {
            return true;
        }
        custom
            .iter()
            .any(|r| r.is_match(&candidate.original_filename))
    }

    /// Associated-name regexes of every custom rule whose main pattern
    /// matches `main`, with captures substituted literally.
    fn custom_matchers(&self, main: &FileRecord) -> Vec<Regex> {
        self.custom
            .iter()
            .filter_map(|(pattern, template)| {
                let caps = pattern.captures(&main.original_filename)?;
                let expanded = self
                    .placeholder
                    .replace_all(template, |m: &Captures| {
                        let value = match (m.get(1), m.get(2)) {
                            (Some(index), _) => index
                                .as_str()
                                .parse::<usize>()
                                .ok()
                                .and_then(|n| caps.get(n)),
                            (None, Some(name)) => caps.name(name.as_str()),
                            _ => None,
                        };
                        regex::escape(value.map(|v| v.as_str()).unwrap_or(""))
                    });
                match RegexBuilder::new(&format!("^(?:{})$", expanded))
                    .case_insensitive(true)
                    .build()
                {
                    Ok(r) => Some(r),
                    Err(e) => {
                        tracing::warn!("Invalid associated pattern '{}': {}", expanded, e);
                        None
                    }
                }
            })
            .collect()
    }
}
