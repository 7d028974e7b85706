//! Sharing declaration loader
//!
//! Builds a [`VirtualTree`] from the sharing file. The first significant line
//! names the root physical directory, optionally followed by the root's
//! owner and rights. Every later line reads
//! `physical_dir virtual_path owner owner_rights others_rights`.

use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::navigate::path::{ROOT_TOKEN, split_path};
use crate::vfs::rights::{Ownership, RightsMask};
use crate::vfs::tree::VirtualTree;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads and parses the sharing file at `path`.
    pub fn load(path: &Path) -> Result<VirtualTree, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            source: e,
        })?;
        let tree = Self::parse(&text)?;
        info!(
            "Loaded {} virtual directories from {}",
            tree.len(),
            path.display()
        );
        debug!("Virtual tree:\n{}", tree.render());
        Ok(tree)
    }

    pub fn parse(text: &str) -> Result<VirtualTree, ConfigError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, tokens(line)))
            .filter(|(_, tokens)| !tokens.is_empty() && !tokens[0].starts_with('#'));

        let (root_line, root_tokens) = lines
            .next()
            .ok_or_else(|| ConfigError::line(1, "missing root directory"))?;
        let mut tree = parse_root(root_line, &root_tokens)?;

        for (line, tokens) in lines {
            apply_share(&mut tree, line, &tokens)?;
        }
        Ok(tree)
    }
}

fn tokens(line: &str) -> Vec<&str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_root(line: usize, tokens: &[&str]) -> Result<VirtualTree, ConfigError> {
    let ownership = match tokens.len() {
        1 => Ownership::default_policy(),
        4 => parse_ownership(line, tokens[1], tokens[2], tokens[3])?,
        n => {
            return Err(ConfigError::line(
                line,
                format!("root line needs 1 or 4 fields, found {n}"),
            ));
        }
    };
    let root_dir = check_dir(line, tokens[0])?;
    Ok(VirtualTree::new_root(Some(root_dir), ownership))
}

fn apply_share(tree: &mut VirtualTree, line: usize, tokens: &[&str]) -> Result<(), ConfigError> {
    if tokens.len() != 5 {
        return Err(ConfigError::line(
            line,
            format!("expected 5 fields, found {}", tokens.len()),
        ));
    }
    let ownership = parse_ownership(line, tokens[2], tokens[3], tokens[4])?;

    let parts = split_path(tokens[1]).map_err(|e| ConfigError::line(line, e.to_string()))?;
    let names: Vec<&str> = parts
        .iter()
        .map(String::as_str)
        .filter(|p| *p != ROOT_TOKEN)
        .collect();
    if names.is_empty() {
        return Err(ConfigError::line(line, "the root cannot be bound twice"));
    }
    if let Some(bad) = names.iter().find(|n| **n == "." || **n == "..") {
        return Err(ConfigError::line(line, format!("'{bad}' is not allowed in a virtual path")));
    }

    let physical = check_dir(line, tokens[0])?;

    let mut node = tree.root();
    let (last, intermediate) = names.split_last().ok_or_else(|| ConfigError::line(line, "empty virtual path"))?;
    for name in intermediate {
        node = match tree.find_child(node, name) {
            Some(child) => child,
            None => tree.add_child(node, *name, None, ownership.clone()),
        };
    }

    match tree.find_child(node, last) {
        None => {
            tree.add_child(node, *last, Some(physical), ownership);
        }
        Some(existing) => {
            if !tree.bind(existing, physical.clone()) {
                return Err(ConfigError::line(
                    line,
                    format!(
                        "{} is already bound to another directory than {}",
                        tokens[1],
                        physical.display()
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn parse_ownership(line: usize, owner: &str, owner_rights: &str, others_rights: &str) -> Result<Ownership, ConfigError> {
    Ok(Ownership::new(
        owner,
        parse_rights(line, owner_rights)?,
        parse_rights(line, others_rights)?,
    ))
}

fn parse_rights(line: usize, raw: &str) -> Result<RightsMask, ConfigError> {
    let bits: u32 = raw
        .parse()
        .map_err(|_| ConfigError::line(line, format!("rights '{raw}' are not a number")))?;
    RightsMask::from_bits(bits).ok_or_else(|| ConfigError::line(line, format!("rights {bits} out of range 0-3")))
}

/// Absolute, openable directory, returned with symlinks resolved.
fn check_dir(line: usize, raw: &str) -> Result<PathBuf, ConfigError> {
    let path = Path::new(raw);
    if !path.is_absolute() {
        return Err(ConfigError::line(line, format!("{raw} is not an absolute path")));
    }
    let resolved = fs::canonicalize(path).map_err(|e| ConfigError::line(line, format!("cannot resolve {raw}: {e}")))?;
    if !resolved.is_dir() {
        return Err(ConfigError::line(line, format!("{raw} is not a directory")));
    }
    fs::read_dir(&resolved).map_err(|e| ConfigError::line(line, format!("cannot open {raw}: {e}")))?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Dirs {
        _tmp: TempDir,
        root: PathBuf,
        films: PathBuf,
        music: PathBuf,
    }

    fn dirs() -> Dirs {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let films = tmp.path().join("films");
        let music = tmp.path().join("music");
        for dir in [&root, &films, &music] {
            fs::create_dir(dir).unwrap();
        }
        Dirs {
            root: root.canonicalize().unwrap(),
            films: films.canonicalize().unwrap(),
            music: music.canonicalize().unwrap(),
            _tmp: tmp,
        }
    }

    fn line_of(err: ConfigError) -> usize {
        err.line_number().unwrap()
    }

    #[test]
    fn builds_intermediate_and_bound_nodes() {
        let d = dirs();
        let text = format!(
            "{}\n\n# media shares\n{} /media/films alice 3 1\n{}, /media/music, none, 0, 1\n",
            d.root.display(),
            d.films.display(),
            d.music.display()
        );
        let tree = ConfigLoader::parse(&text).unwrap();

        let media = tree.find_child(tree.root(), "media").unwrap();
        assert!(!tree.node(media).is_bound());
        assert_eq!(tree.node(media).ownership.owner, "alice");

        let films = tree.find_child(media, "films").unwrap();
        assert_eq!(tree.node(films).physical(), Some(d.films.as_path()));
        assert_eq!(tree.node(films).ownership.owner_rights, RightsMask::ALL);
        assert_eq!(tree.full_virtual_path(films), "/media/films");

        let music = tree.find_child(media, "music").unwrap();
        assert_eq!(tree.node(music).ownership.others_rights, RightsMask::READ);
        assert_eq!(tree.node(tree.root()).ownership, Ownership::default_policy());
    }

    #[test]
    fn root_line_may_carry_rights() {
        let d = dirs();
        let tree = ConfigLoader::parse(&format!("{} admin 3 0", d.root.display())).unwrap();
        assert_eq!(tree.node(tree.root()).ownership.owner, "admin");
        assert_eq!(tree.node(tree.root()).physical(), Some(d.root.as_path()));
    }

    #[test]
    fn unbound_node_can_be_filled_later_but_not_rebound() {
        let d = dirs();
        let base = format!(
            "{}\n{} /a/b alice 3 1\n{} /a alice 3 1\n",
            d.root.display(),
            d.films.display(),
            d.music.display()
        );
        let tree = ConfigLoader::parse(&base).unwrap();
        let a = tree.find_child(tree.root(), "a").unwrap();
        assert_eq!(tree.node(a).physical(), Some(d.music.as_path()));

        let same = format!("{base}{} /a alice 3 1\n", d.music.display());
        assert!(ConfigLoader::parse(&same).is_ok());

        let conflict = format!("{base}{} /a alice 3 1\n", d.films.display());
        assert_eq!(line_of(ConfigLoader::parse(&conflict).unwrap_err()), 4);
    }

    #[test]
    fn filled_node_keeps_the_rights_it_was_created_with() {
        let d = dirs();
        let text = format!(
            "{}\n{} /a/b alice 3 1\n{} /a bob 1 0\n",
            d.root.display(),
            d.films.display(),
            d.music.display()
        );
        let tree = ConfigLoader::parse(&text).unwrap();
        let a = tree.find_child(tree.root(), "a").unwrap();
        assert_eq!(tree.node(a).physical(), Some(d.music.as_path()));
        assert_eq!(
            tree.node(a).ownership,
            Ownership::new("alice", RightsMask::ALL, RightsMask::READ)
        );
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let d = dirs();
        let root = d.root.display();
        let films = d.films.display();
        let cases = [
            format!("{root}\n{films} /x alice 3\n"),
            format!("{root}\n{films} /x alice three 1\n"),
            format!("{root}\n{films} /x alice 3 4\n"),
            format!("{root}\n{films} / alice 3 1\n"),
            format!("{root}\n{films} /x//y alice 3 1\n"),
            format!("{root}\n{films} /x/../y alice 3 1\n"),
            format!("{root}\nrelative/dir /x alice 3 1\n"),
            format!("{root}\n{films}/missing /x alice 3 1\n"),
        ];
        for text in cases {
            assert_eq!(line_of(ConfigLoader::parse(&text).unwrap_err()), 2, "{text}");
        }
    }

    #[test]
    fn bad_root_is_line_one() {
        assert_eq!(line_of(ConfigLoader::parse("").unwrap_err()), 1);
        assert_eq!(line_of(ConfigLoader::parse("not/absolute\n").unwrap_err()), 1);
        assert_eq!(line_of(ConfigLoader::parse("/ a 1\n").unwrap_err()), 1);
    }

    #[test]
    fn symlinked_share_is_resolved() {
        let d = dirs();
        let link = d.root.join("films-link");
        std::os::unix::fs::symlink(&d.films, &link).unwrap();

        let text = format!("{}\n{}/ /films alice 3 1\n", d.root.display(), link.display());
        let tree = ConfigLoader::parse(&text).unwrap();
        let films = tree.find_child(tree.root(), "films").unwrap();
        assert_eq!(tree.node(films).physical(), Some(d.films.as_path()));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = ConfigLoader::load(Path::new("/nonexistent/shares.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }
}
