// src/core/classifier.rs
//! File classification and cluster assignment
//!
//! Maps a path to a static file-type descriptor (label, colors, coarse
//! category) and groups paths by their top-level directory.

use indexmap::IndexMap;
use serde::Serialize;

/// Cluster key shared by every file at the repository root
pub const ROOT_CLUSTER: &str = "(root)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Component,
    Logic,
    Style,
    Config,
    Docs,
    Markup,
    Asset,
    Data,
    Script,
    Other,
}

/// Display information for a file extension
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTypeDescriptor {
    pub label: &'static str,
    pub color: &'static str,
    /// Brighter RGB triple used for emphasis when rendering
    pub emphasis_color: [f32; 3],
    pub category: FileCategory,
}

const fn descriptor(
    label: &'static str,
    color: &'static str,
    emphasis_color: [f32; 3],
    category: FileCategory,
) -> FileTypeDescriptor {
    FileTypeDescriptor { label, color, emphasis_color, category }
}

use FileCategory::*;

const COMPONENT_GREEN: [f32; 3] = [0.0, 2.0, 1.2];
const LOGIC_GREEN: [f32; 3] = [0.04, 1.6, 1.0];
const STYLE_PINK: [f32; 3] = [2.2, 0.5, 0.8];
const CONFIG_AMBER: [f32; 3] = [2.2, 1.5, 0.4];
const DOCS_VIOLET: [f32; 3] = [1.0, 0.6, 2.0];
const MUTED_GREY: [f32; 3] = [0.6, 0.6, 0.6];

static TSX: FileTypeDescriptor = descriptor("TypeScript React", "#00E89C", COMPONENT_GREEN, Component);
static JSX: FileTypeDescriptor = descriptor("JavaScript React", "#00E89C", COMPONENT_GREEN, Component);
static TS: FileTypeDescriptor = descriptor("TypeScript", "#0ABF80", LOGIC_GREEN, Logic);
static JS: FileTypeDescriptor = descriptor("JavaScript", "#0ABF80", LOGIC_GREEN, Logic);
static MJS: FileTypeDescriptor = descriptor("ES Module", "#0ABF80", LOGIC_GREEN, Logic);
static CJS: FileTypeDescriptor = descriptor("CommonJS", "#0ABF80", LOGIC_GREEN, Logic);
static MTS: FileTypeDescriptor = descriptor("TS Module", "#0ABF80", LOGIC_GREEN, Logic);
static CTS: FileTypeDescriptor = descriptor("TS CommonJS", "#0ABF80", LOGIC_GREEN, Logic);
static CSS: FileTypeDescriptor = descriptor("CSS", "#FF5C87", STYLE_PINK, Style);
static SCSS: FileTypeDescriptor = descriptor("SCSS", "#FF5C87", STYLE_PINK, Style);
static LESS: FileTypeDescriptor = descriptor("Less", "#FF5C87", STYLE_PINK, Style);
static JSON: FileTypeDescriptor = descriptor("JSON", "#FFB444", CONFIG_AMBER, Config);
static YAML: FileTypeDescriptor = descriptor("YAML", "#FFB444", CONFIG_AMBER, Config);
static TOML: FileTypeDescriptor = descriptor("TOML", "#FFB444", CONFIG_AMBER, Config);
static XML: FileTypeDescriptor = descriptor("XML", "#FFB444", CONFIG_AMBER, Config);
static MD: FileTypeDescriptor = descriptor("Markdown", "#9171F8", DOCS_VIOLET, Docs);
static MDX: FileTypeDescriptor = descriptor("MDX", "#9171F8", DOCS_VIOLET, Docs);
static TXT: FileTypeDescriptor = descriptor("Text", "#999999", [0.8, 0.8, 1.0], Docs);
static PY: FileTypeDescriptor = descriptor("Python", "#3776AB", [0.4, 0.9, 1.8], Logic);
static RS: FileTypeDescriptor = descriptor("Rust", "#CE422B", [2.0, 0.5, 0.3], Logic);
static GO: FileTypeDescriptor = descriptor("Go", "#00ADD8", [0.0, 1.5, 2.0], Logic);
static JAVA: FileTypeDescriptor = descriptor("Java", "#ED8B00", [2.0, 1.0, 0.0], Logic);
static RB: FileTypeDescriptor = descriptor("Ruby", "#CC342D", [2.0, 0.3, 0.3], Logic);
static PHP: FileTypeDescriptor = descriptor("PHP", "#777BB4", [1.0, 1.0, 1.8], Logic);
static SWIFT: FileTypeDescriptor = descriptor("Swift", "#F05138", [2.2, 0.4, 0.3], Logic);
static KT: FileTypeDescriptor = descriptor("Kotlin", "#7F52FF", [1.0, 0.5, 2.2], Logic);
static VUE: FileTypeDescriptor = descriptor("Vue", "#42B883", [0.4, 1.8, 1.0], Component);
static SVELTE: FileTypeDescriptor = descriptor("Svelte", "#FF3E00", [2.2, 0.3, 0.0], Component);
static HTML: FileTypeDescriptor = descriptor("HTML", "#E34F26", [2.0, 0.4, 0.2], Markup);
static SVG: FileTypeDescriptor = descriptor("SVG", "#FFB13B", [2.2, 1.5, 0.3], Asset);
static SQL: FileTypeDescriptor = descriptor("SQL", "#336791", [0.4, 0.6, 1.5], Data);
static GRAPHQL: FileTypeDescriptor = descriptor("GraphQL", "#E10098", [2.0, 0.0, 1.2], Data);
static PRISMA: FileTypeDescriptor = descriptor("Prisma", "#2D3748", [0.4, 0.5, 0.6], Data);
static SH: FileTypeDescriptor = descriptor("Shell", "#89E051", [1.0, 2.0, 0.5], Script);
static DOCKERFILE: FileTypeDescriptor = descriptor("Dockerfile", "#2496ED", [0.3, 1.2, 2.0], Config);
static ENV: FileTypeDescriptor = descriptor("Environment", "#888888", MUTED_GREY, Config);
static LOCK: FileTypeDescriptor = descriptor("Lock File", "#888888", MUTED_GREY, Config);
static GITIGNORE: FileTypeDescriptor = descriptor("Gitignore", "#888888", MUTED_GREY, Config);
static EDITORCONFIG: FileTypeDescriptor = descriptor("EditorConfig", "#888888", MUTED_GREY, Config);
static NPMIGNORE: FileTypeDescriptor = descriptor("npmignore", "#888888", MUTED_GREY, Config);

/// Descriptor for extensions missing from the table
pub static DEFAULT_FILE_TYPE: FileTypeDescriptor =
    descriptor("File", "#7B8794", [0.6, 0.8, 1.2], Other);

/// Look up the descriptor for an extension as produced by [`get_extension`]
pub fn descriptor_for_extension(extension: &str) -> &'static FileTypeDescriptor {
    match extension {
        "tsx" => &TSX,
        "jsx" => &JSX,
        "ts" => &TS,
        "js" => &JS,
        "mjs" => &MJS,
        "cjs" => &CJS,
        "mts" => &MTS,
        "cts" => &CTS,
        "css" => &CSS,
        "scss" => &SCSS,
        "less" => &LESS,
        "json" => &JSON,
        "yaml" | "yml" => &YAML,
        "toml" => &TOML,
        "xml" => &XML,
        "md" => &MD,
        "mdx" => &MDX,
        "txt" => &TXT,
        "py" => &PY,
        "rs" => &RS,
        "go" => &GO,
        "java" => &JAVA,
        "rb" => &RB,
        "php" => &PHP,
        "swift" => &SWIFT,
        "kt" => &KT,
        "vue" => &VUE,
        "svelte" => &SVELTE,
        "html" => &HTML,
        "svg" => &SVG,
        "sql" => &SQL,
        "graphql" => &GRAPHQL,
        "prisma" => &PRISMA,
        "sh" => &SH,
        "dockerfile" => &DOCKERFILE,
        "env" => &ENV,
        "lock" => &LOCK,
        "gitignore" => &GITIGNORE,
        "editorconfig" => &EDITORCONFIG,
        "npmignore" => &NPMIGNORE,
        _ => &DEFAULT_FILE_TYPE,
    }
}

/// Classify a path by its extension
pub fn classify(path: &str) -> &'static FileTypeDescriptor {
    descriptor_for_extension(&get_extension(path))
}

/// Last path segment
pub fn get_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Lower-cased file-type tag for a path
///
/// Well-known extensionless names get their own tag, declaration files
/// (`.d.ts` and friends) count as `ts`, and names without a usable dot
/// yield an empty string.
pub fn get_extension(path: &str) -> String {
    let name = get_file_name(path);
    let lower = name.to_lowercase();

    match lower.as_str() {
        "dockerfile" => return "dockerfile".to_string(),
        ".gitignore" => return "gitignore".to_string(),
        ".editorconfig" => return "editorconfig".to_string(),
        ".npmignore" => return "npmignore".to_string(),
        "license" | "licence" => return "txt".to_string(),
        "makefile" => return "sh".to_string(),
        _ => {}
    }

    if lower.starts_with(".env") {
        return "env".to_string();
    }
    if [".d.ts", ".d.mts", ".d.cts"].iter().any(|s| lower.ends_with(s)) {
        return "ts".to_string();
    }

    match lower.rfind('.') {
        None | Some(0) => String::new(),
        Some(idx) => lower[idx + 1..].to_string(),
    }
}

/// Maps top-level directories to dense cluster indices in first-seen order
///
/// One table is built per import and threaded through node construction.
#[derive(Debug, Clone, Default)]
pub struct ClusterTable {
    indices: IndexMap<String, usize>,
}

impl ClusterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster index for a path, allocating a new one for unseen directories
    pub fn assign(&mut self, path: &str) -> usize {
        let key = match path.split_once('/') {
            Some((top, _)) => top,
            None => ROOT_CLUSTER,
        };

        if let Some(&index) = self.indices.get(key) {
            return index;
        }

        let index = self.indices.len();
        self.indices.insert(key.to_string(), index);
        index
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Cluster keys in index order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }
}
