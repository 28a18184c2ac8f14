//! Shared fixtures: generated PDFs and in-process fake providers

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pdf_rag::config::RagConfig;
use pdf_rag::error::{Error, Result};
use pdf_rag::providers::{EmbeddingProvider, FragmentStream, GenerationProvider, ProviderSet};
use pdf_rag::{RagService, StoreRegistry};

pub const SOLAR_PAGES: [&str; 3] = [
    "Solar panels convert sunlight into electricity for the household. \
     The array on the roof has twenty panels facing south. \
     Panel output peaks around noon on clear summer days. \
     Clean the panels twice a year to keep efficiency high. \
     Shading from trees reduces the output of the whole string. \
     The inverter turns direct current into alternating current. \
     Each panel is rated at four hundred watts under standard test conditions. \
     Snow usually slides off the panels within a day of sunshine. \
     A monitoring app shows the daily production of the array.",
    "The battery stores surplus solar energy for the evening. \
     Battery capacity is ten kilowatt hours of usable storage. \
     The battery charges when panels produce more than the house uses. \
     Deep discharge shortens battery life so the controller keeps a reserve. \
     Battery temperature must stay between five and thirty five degrees. \
     Replace the battery after roughly ten years of daily cycling. \
     The battery cabinet needs a ventilation gap on every side. \
     Backup mode reserves part of the battery for power cuts. \
     The status screen shows the state of charge as a percentage.",
    "Grid connection lets the house export extra electricity. \
     The meter records both imported and exported energy. \
     During a grid outage the system isolates itself for safety. \
     Maintenance visits check wiring, fuses, and the grid relay. \
     Call the installer if the inverter shows a red warning light. \
     Keep this manual near the inverter for quick reference. \
     Export limits are set by the local network operator. \
     The feed in tariff is paid for every exported kilowatt hour. \
     A yearly inspection keeps the warranty valid for the whole system.",
];

pub const GARDEN_PAGES: [&str; 3] = [
    "Tomatoes need full sun and regular watering in the garden.",
    "Compost improves soil structure and feeds the vegetable beds.",
    "Harvest beans often so the plants keep producing new pods.",
];

/// Build a PDF with one page per entry, using the built-in Courier font
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]),
            Operation::new("TL", vec![Object::Integer(14)]),
            Operation::new("Td", vec![Object::Integer(40), Object::Integer(800)]),
        ];
        for line in wrap(text, 80) {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Write a generated PDF into `dir`
pub fn write_pdf(dir: &Path, filename: &str, pages: &[&str]) -> PathBuf {
    let path = dir.join(filename);
    std::fs::write(&path, pdf_bytes(pages)).unwrap();
    path
}

/// Bag-of-words embedder: each word hashes into one of 256 buckets
pub struct HashEmbedder {
    model: String,
    calls: AtomicUsize,
    texts_embedded: AtomicUsize,
    fail: AtomicBool,
}

impl HashEmbedder {
    pub const DIMENSIONS: usize = 256;

    pub fn new() -> Self {
        Self::with_model("hash-embed")
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; Self::DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
        {
            // FNV-1a
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.to_lowercase().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % Self::DIMENSIONS as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::embedding_unavailable(&self.model, "connection refused"));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.fail.load(Ordering::SeqCst))
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// How [`ScriptedGenerator::generate_stream`] behaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamMode {
    /// Yield every fragment
    Complete,
    /// Fail before the first fragment
    Unavailable,
    /// Yield this many fragments, then fail
    FailAfter(usize),
}

/// Generator returning scripted paraphrases and answer fragments
pub struct ScriptedGenerator {
    variants: Mutex<String>,
    fragments: Vec<String>,
    mode: Mutex<StreamMode>,
    generate_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    released: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn new(variants: &str, fragments: &[&str]) -> Self {
        Self {
            variants: Mutex::new(variants.to_string()),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            mode: Mutex::new(StreamMode::Complete),
            generate_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Five paraphrases and a three-fragment answer
    pub fn standard() -> Self {
        Self::new(
            "1. What does the solar manual describe?\n\
             2. Which topics does this document cover?\n\
             3. What is the purpose of the battery?\n\
             4. How is the inverter maintained?\n\
             5. What does the grid connection do?",
            &["This document ", "is a manual ", "for a home solar system."],
        )
    }

    pub fn set_mode(&self, mode: StreamMode) {
        *self.mode.lock() = mode;
    }

    pub fn set_variants(&self, variants: &str) {
        *self.variants.lock() = variants.to_string();
    }

    pub fn calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst) + self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Streams dropped or exhausted so far
    pub fn released_streams(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

/// Counts the stream as released when dropped
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        let mode = *self.mode.lock();
        let items: Vec<Result<String>> = match mode {
            StreamMode::Complete => self.fragments.iter().cloned().map(Ok).collect(),
            StreamMode::Unavailable => {
                return Err(Error::generation_unavailable("scripted", "connection refused"))
            }
            StreamMode::FailAfter(n) => self
                .fragments
                .iter()
                .take(n)
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(Error::generation_interrupted(
                    "scripted",
                    "connection reset",
                ))))
                .collect(),
        };

        // The guard lives in the stream state, so it drops with the stream
        let state = (items.into_iter(), ReleaseGuard(Arc::clone(&self.released)));
        Ok(stream::unfold(state, |(mut items, guard)| async move {
            items.next().map(|item| (item, (items, guard)))
        })
        .boxed())
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        Ok(self.variants.lock().clone())
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A service over a temporary store root with fake providers
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub embedder: Arc<HashEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
    pub registry: Arc<StoreRegistry>,
    pub service: Arc<RagService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HashEmbedder::new(), ScriptedGenerator::standard())
    }

    pub fn with(embedder: HashEmbedder, generator: ScriptedGenerator) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.storage.root = dir.path().join("db");
        config.embeddings.batch_size = 2;

        let embedder = Arc::new(embedder);
        let generator = Arc::new(generator);
        let registry = Arc::new(StoreRegistry::new());
        let providers = ProviderSet {
            embedder: embedder.clone(),
            generator: generator.clone(),
        };
        let service = Arc::new(RagService::with_providers(config, providers, Arc::clone(&registry)));

        Self {
            dir,
            embedder,
            generator,
            registry,
            service,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.service.config().storage.root.clone()
    }

    /// Write a PDF next to the store root
    pub fn pdf(&self, filename: &str, pages: &[&str]) -> PathBuf {
        write_pdf(self.dir.path(), filename, pages)
    }

    /// Directory entries under the store root, hidden ones included
    pub fn root_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.root())
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
