// src/watch/event.rs

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::Event;

/// File names that came into existence with this event.
///
/// Creations and the destination side of renames count; everything else
/// (content changes, removals, access) is ignored. Producers that write a
/// temporary file and rename it into place are therefore seen once.
pub fn created_file_names(event: &Event) -> Vec<String> {
    let paths = match event.kind {
        EventKind::Create(_) => &event.paths[..],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths[..],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or(&[])
        }
        _ => return Vec::new(),
    };

    paths
        .iter()
        .filter_map(|path| path.file_name())
        .filter_map(|name| name.to_str())
        .map(str::to_string)
        .collect()
}
