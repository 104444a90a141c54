//! Zip and settings fixtures.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use kitpack_core::config::Settings;
use url::Url;
use zip::write::SimpleFileOptions;

/// Build a zip in memory. Names ending in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).expect("add directory");
            } else {
                zip.start_file(*name, options).expect("start file");
                zip.write_all(content).expect("write entry");
            }
        }
        zip.finish().expect("finish zip");
    }
    buf.into_inner()
}

/// Entry names of a zip file, in archive order.
pub fn entry_names(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("open zip");
    let archive = zip::ZipArchive::new(file).expect("read zip");
    archive.file_names().map(str::to_string).collect()
}

/// Entry name -> decompressed content.
pub fn entry_contents(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let file = std::fs::File::open(path).expect("open zip");
    let mut archive = zip::ZipArchive::new(file).expect("read zip");
    let mut contents = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).expect("entry");
        let mut data = Vec::new();
        entry.read_to_end(&mut data).expect("read entry");
        contents.insert(entry.name().to_string(), data);
    }
    contents
}

/// Settings pointing both the API and web hosts at `base`.
pub fn settings_for(base: &str) -> Settings {
    let mut settings = Settings::default();
    settings.github.token = Some("gh-test-token".to_string());
    settings.github.api_url = Url::parse(base).expect("api url");
    settings.github.web_url = Url::parse(base).expect("web url");
    settings.product.repo = Some("acme/widget".to_string());
    settings.integrations.repo = Some("acme/widget-envs".to_string());
    settings.fetch.timeout_secs = 2;
    settings
}
