use std::fs;

use vergit_hash::ObjectId;

use crate::{LooseError, LooseObjectStore};

impl LooseObjectStore {
    /// Find loose objects whose hex OID starts with `prefix`.
    ///
    /// The prefix must be at least 3 hex chars: the first two select the
    /// fan-out directory and the rest filters filenames inside it. Shorter
    /// prefixes are answered from pack indexes only (§ the caller).
    pub fn prefix_matches(&self, prefix: &str) -> Result<Vec<ObjectId>, LooseError> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < 3 || prefix.len() > 40 {
            return Ok(Vec::new());
        }

        let (dir_name, rest) = prefix.split_at(2);
        let dir = self.objects_dir().join(dir_name);

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() != 38 || !name.starts_with(rest) {
                continue;
            }
            if let Ok(oid) = ObjectId::from_hex(&format!("{dir_name}{name}")) {
                matches.push(oid);
            }
        }
        Ok(matches)
    }
}
