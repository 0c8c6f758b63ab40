//! `NAME=PATH` parsing for the repeatable additional-channel flag.

use std::path::PathBuf;

use thiserror::Error;

use atlasreg_pipeline::ChannelConfig;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("channel '{0}' is missing '='; expected NAME=PATH")]
    MissingSeparator(String),

    #[error("channel '{0}' has an empty name")]
    EmptyName(String),

    #[error("channel '{0}' has an empty path")]
    EmptyPath(String),
}

/// Parse one `NAME=PATH` channel argument.
///
/// A name carrying a `.tif`/`.tiff` extension is trimmed to its stem,
/// so `--additional-channel red.tiff=/data/red` still exports
/// `downsampled_red.tiff`.
pub fn parse_channel(input: &str) -> Result<ChannelConfig, ParseError> {
    let Some((name, path)) = input.split_once('=') else {
        return Err(ParseError::MissingSeparator(input.to_string()));
    };
    let name = name.trim();
    let path = path.trim();
    if name.is_empty() {
        return Err(ParseError::EmptyName(input.to_string()));
    }
    if path.is_empty() {
        return Err(ParseError::EmptyPath(input.to_string()));
    }
    Ok(ChannelConfig {
        name: trim_tiff_extension(name),
        path: PathBuf::from(path),
    })
}

fn trim_tiff_extension(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    for ext in [".tiff", ".tif"] {
        if lower.ends_with(ext) {
            return name[..name.len() - ext.len()].to_string();
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn parses_name_and_path() {
        let channel = parse_channel("red=/data/red_channel").unwrap();
        assert_eq!(channel.name, "red");
        assert_eq!(channel.path, Path::new("/data/red_channel"));
    }

    #[test]
    fn trims_tiff_extension_from_the_name() {
        let channel = parse_channel("green.tiff=/data/green.tiff").unwrap();
        assert_eq!(channel.name, "green");
        assert_eq!(channel.path, Path::new("/data/green.tiff"));

        let channel = parse_channel("BLUE.TIF=/data/blue").unwrap();
        assert_eq!(channel.name, "BLUE");
    }

    #[test]
    fn keeps_dots_inside_names() {
        let channel = parse_channel("ch.1=/data/ch1").unwrap();
        assert_eq!(channel.name, "ch.1");
    }

    #[test]
    fn splits_on_the_first_equals_only() {
        let channel = parse_channel("red=/data/name=odd").unwrap();
        assert_eq!(channel.name, "red");
        assert_eq!(channel.path, Path::new("/data/name=odd"));
    }

    #[test]
    fn rejects_malformed_arguments() {
        assert!(matches!(
            parse_channel("red"),
            Err(ParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            parse_channel("=/data/red"),
            Err(ParseError::EmptyName(_))
        ));
        assert!(matches!(parse_channel("red="), Err(ParseError::EmptyPath(_))));
    }
}
