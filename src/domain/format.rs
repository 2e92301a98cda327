//! Extension-based classification of requested assets.

use std::path::Path;

/// Extensions rendered by the remote service, mapped to its diagram type identifiers.
///
/// The identifiers are part of the rendering service's URL contract.
pub const DYNAMIC_FORMATS: &[(&str, &str)] = &[
    ("puml", "plantuml"),
    ("plantuml", "plantuml"),
    ("pu", "plantuml"),
    ("c4puml", "c4plantuml"),
    ("c4plantuml", "c4plantuml"),
    ("mmd", "mermaid"),
    ("mermaid", "mermaid"),
    ("d2", "d2"),
    ("dot", "graphviz"),
    ("gv", "graphviz"),
    ("graphviz", "graphviz"),
    ("blockdiag", "blockdiag"),
    ("seqdiag", "seqdiag"),
    ("actdiag", "actdiag"),
    ("nwdiag", "nwdiag"),
    ("packetdiag", "packetdiag"),
    ("rackdiag", "rackdiag"),
    ("erd", "erd"),
    ("dbml", "dbml"),
    ("bpmn", "bpmn"),
    ("nomnoml", "nomnoml"),
    ("ditaa", "ditaa"),
    ("svgbob", "svgbob"),
    ("pikchr", "pikchr"),
    ("umlet", "umlet"),
    ("excalidraw", "excalidraw"),
    ("structurizr", "structurizr"),
    ("vega", "vega"),
    ("vegalite", "vegalite"),
    ("vl", "vegalite"),
    ("wavedrom", "wavedrom"),
    ("wireviz", "wireviz"),
    ("bytefield", "bytefield"),
];

/// Image extensions served unmodified, mapped to their MIME types.
pub const STATIC_FORMATS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClassification {
    /// Diagram source; carries the remote diagram type identifier.
    Dynamic(&'static str),
    /// Ready-made image; carries the MIME type.
    Static(&'static str),
    Unsupported,
}

/// Classify an extension, with or without its leading dot, ignoring case.
pub fn classify(extension: &str) -> FormatClassification {
    let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
    if normalized.is_empty() {
        return FormatClassification::Unsupported;
    }

    if let Some((_, diagram_type)) = DYNAMIC_FORMATS.iter().find(|(ext, _)| *ext == normalized) {
        return FormatClassification::Dynamic(*diagram_type);
    }
    if let Some((_, mime)) = STATIC_FORMATS.iter().find(|(ext, _)| *ext == normalized) {
        return FormatClassification::Static(*mime);
    }
    FormatClassification::Unsupported
}

/// The extension of the final path segment, without the dot. Dotfiles have none.
pub fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|ext| ext.to_str())
}
