//! Assertions over produced archives and emitted events

use std::fs::File;
use std::path::Path;
use tokio::sync::broadcast;
use xbox_savegame_dl::Event;

/// Sorted entry names of a ZIP archive
pub fn zip_entries(zip_path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
    let mut names: Vec<_> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

/// Contents of one archive entry
pub fn zip_entry(zip_path: &Path, name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut contents = Vec::new();
    std::io::copy(&mut entry, &mut contents).unwrap();
    contents
}

/// Every event received so far
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
