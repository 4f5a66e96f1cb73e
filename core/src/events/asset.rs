//! Asset path classification: type, category and importer inference.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetCategory {
    Rendering,
    Textures,
    Materials,
    Prefabs,
    Scenes,
    #[serde(rename = "3D Models")]
    Models,
    Scripts,
    Assemblies,
    #[serde(rename = "Scriptable Objects")]
    ScriptableObjects,
    Animation,
    Physics,
    Fonts,
    Audio,
    Video,
    #[serde(rename = "Sprite Atlas")]
    SpriteAtlas,
    Other,
}

impl AssetCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rendering => "Rendering",
            Self::Textures => "Textures",
            Self::Materials => "Materials",
            Self::Prefabs => "Prefabs",
            Self::Scenes => "Scenes",
            Self::Models => "3D Models",
            Self::Scripts => "Scripts",
            Self::Assemblies => "Assemblies",
            Self::ScriptableObjects => "Scriptable Objects",
            Self::Animation => "Animation",
            Self::Physics => "Physics",
            Self::Fonts => "Fonts",
            Self::Audio => "Audio",
            Self::Video => "Video",
            Self::SpriteAtlas => "Sprite Atlas",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final path component.
pub fn asset_name(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
}

/// Lowercase extension of the final component, without the dot.
pub fn extension(path: &str) -> Option<String> {
    let name = asset_name(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => Some(name[idx + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

pub fn asset_type(path: &str) -> String {
    extension(path).unwrap_or_else(|| "no-extension".to_string())
}

fn category_for_extension(ext: &str) -> AssetCategory {
    match ext {
        "shader" | "compute" | "cginc" | "hlsl" | "shadergraph" | "shadersubgraph" => {
            AssetCategory::Rendering
        }
        "png" | "jpg" | "jpeg" | "tga" | "psd" | "exr" | "hdr" | "tif" | "tiff" | "bmp" | "gif" => {
            AssetCategory::Textures
        }
        "mat" => AssetCategory::Materials,
        "prefab" => AssetCategory::Prefabs,
        "unity" => AssetCategory::Scenes,
        "fbx" | "obj" | "blend" | "dae" | "3ds" => AssetCategory::Models,
        "cs" | "js" => AssetCategory::Scripts,
        "dll" | "asmdef" | "asmref" => AssetCategory::Assemblies,
        "asset" => AssetCategory::ScriptableObjects,
        "anim" | "controller" | "overridecontroller" | "mask" => AssetCategory::Animation,
        "physicmaterial" | "physicsmaterial2d" => AssetCategory::Physics,
        "ttf" | "otf" | "fontsettings" => AssetCategory::Fonts,
        "wav" | "mp3" | "ogg" | "aif" | "aiff" | "flac" => AssetCategory::Audio,
        "mp4" | "mov" | "avi" | "webm" | "m4v" | "mpg" | "mpeg" => AssetCategory::Video,
        "spriteatlas" | "spriteatlasv2" => AssetCategory::SpriteAtlas,
        _ => AssetCategory::Other,
    }
}

/// Category for an import. The importer wins over the extension where the
/// two disagree.
pub fn classify(path: &str, importer: Option<&str>, is_animation: bool) -> AssetCategory {
    if importer == Some("TextureImporter") {
        return AssetCategory::Textures;
    }
    if is_animation {
        return AssetCategory::Animation;
    }
    extension(path)
        .map(|ext| category_for_extension(&ext))
        .unwrap_or(AssetCategory::Other)
}

/// Importer Unity would have used for this extension.
pub fn infer_importer(path: &str) -> &'static str {
    match extension(path).as_deref() {
        Some("fbx") => "FBXImporter",
        Some("png" | "jpg" | "jpeg" | "exr" | "tga" | "hdr" | "tif" | "tiff" | "bmp" | "psd") => {
            "TextureImporter"
        }
        Some("mat" | "anim" | "controller") => "NativeFormatImporter",
        Some("prefab") => "PrefabImporter",
        Some("mp4" | "mov" | "avi" | "webm" | "m4v" | "mpg" | "mpeg") => "VideoClipImporter",
        Some("wav" | "mp3" | "ogg" | "aif" | "aiff" | "flac") => "AudioImporter",
        Some("cs") => "MonoImporter",
        Some("shader") => "ShaderImporter",
        _ => "UnknownImporter",
    }
}

/// Clean up the importer text printed after a GUID.
///
/// Accepts `(TextureImporter)` or a bare name. Placeholders such as `-1`,
/// `Importer(-1,...)` or anything not ending in `Importer` yield `None`.
pub fn normalize_importer(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('(').trim_end_matches(')').trim();
    if trimmed.is_empty() || trimmed.contains("-1") || !trimmed.ends_with("Importer") {
        return None;
    }
    Some(trimmed.to_string())
}

/// Importer to record: the printed one if valid, otherwise inferred.
pub fn resolve_importer(path: &str, printed: Option<&str>) -> String {
    printed
        .and_then(normalize_importer)
        .unwrap_or_else(|| infer_importer(path).to_string())
}

pub fn is_animation(path: &str, importer: Option<&str>) -> bool {
    matches!(extension(path).as_deref(), Some("anim"))
        || importer.is_some_and(|i| i.contains("Animation"))
}

/// Pseudo-entries that are not real imports: package roots such as
/// `Packages/com.unity.ugui`, and folders imported by `DefaultImporter`.
pub fn is_skipped_entry(path: &str, importer: Option<&str>) -> bool {
    let name = asset_name(path);
    if name.starts_with("com.") && path.matches('/').count() <= 2 {
        return true;
    }
    importer == Some("DefaultImporter") && extension(path).is_none()
}
