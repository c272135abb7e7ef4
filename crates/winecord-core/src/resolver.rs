//! Executable name to display title
//!
//! `resolve` is pure: the same inputs always give the same title.

use std::collections::{HashMap, HashSet};

const EXE_EXTENSION: &str = ".exe";

/// Unreal Engine packaging leaves these on shipping builds
const ENGINE_SUFFIXES: [&str; 2] = ["-Win32-Shipping", "-Win64-Shipping"];

/// Turn a raw executable path into a display title.
///
/// Returns an empty string when the path is not a Windows executable or its
/// name is blacklisted. Blacklist wins over overrides.
pub fn resolve(
    raw_path: &str,
    blacklist: &HashSet<String>,
    overrides: &HashMap<String, String>,
) -> String {
    if raw_path.is_empty() {
        return String::new();
    }

    let normalized = raw_path.replace("\\\\", "/").replace('\\', "/");
    let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);

    let Some(stem) = strip_exe_extension(file_name) else {
        return String::new();
    };
    let base = strip_engine_suffix(stem);

    let key = base.to_lowercase();
    if blacklist.contains(&key) {
        return String::new();
    }
    if let Some(title) = overrides.get(&key) {
        return title.clone();
    }

    split_camel_case(base)
}

/// The executable part of a process command line: everything from the first
/// non-blank character up to and including the first `.exe`, so paths with
/// spaces survive and trailing arguments are dropped.
pub fn exe_candidate(command_line: &str) -> Option<&str> {
    let trimmed = command_line.trim_start();
    // ASCII lowercasing keeps byte offsets aligned with `trimmed`
    let lower = trimmed.to_ascii_lowercase();
    lower
        .find(EXE_EXTENSION)
        .map(|idx| &trimmed[..idx + EXE_EXTENSION.len()])
}

fn strip_exe_extension(file_name: &str) -> Option<&str> {
    let split = file_name.len().checked_sub(EXE_EXTENSION.len())?;
    if !file_name.is_char_boundary(split) {
        return None;
    }
    let (stem, ext) = file_name.split_at(split);
    ext.eq_ignore_ascii_case(EXE_EXTENSION).then_some(stem)
}

fn strip_engine_suffix(stem: &str) -> &str {
    ENGINE_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
        .unwrap_or(stem)
}

/// "TheMessenger" -> "The Messenger"
fn split_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if prev_lower && c.is_uppercase() {
            out.push(' ');
        }
        out.push(c);
        prev_lower = c.is_lowercase();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn map(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn plain(path: &str) -> String {
        resolve(path, &HashSet::new(), &HashMap::new())
    }

    #[test]
    fn test_rejects_non_executables() {
        assert_eq!(plain(""), "");
        assert_eq!(plain("/usr/bin/crashpad_handler"), "");
        assert_eq!(plain("C:\\Games\\readme.txt"), "");
        assert_eq!(plain("game.exe.bak"), "");
        assert_eq!(plain(".ex"), "");
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(plain("C:\\Games\\Celeste.EXE"), "Celeste");
        assert_eq!(plain("Hades.Exe"), "Hades");
    }

    #[test]
    fn test_camel_case_split() {
        assert_eq!(plain("TheMessenger.exe"), "The Messenger");
        assert_eq!(plain("HollowKnightSilksong.exe"), "Hollow Knight Silksong");
    }

    #[test]
    fn test_names_without_case_transitions_unchanged() {
        assert_eq!(plain("witcher3.exe"), "witcher3");
        assert_eq!(plain("DOOM.exe"), "DOOM");
        assert_eq!(plain("GTA5.exe"), "GTA5");
    }

    #[test]
    fn test_engine_suffix_stripped() {
        assert_eq!(plain("Game-Win64-Shipping.exe"), "Game");
        assert_eq!(plain("StrayGame-Win32-Shipping.exe"), "Stray Game");
        assert_eq!(plain("Game-Linux-Shipping.exe"), "Game-Linux-Shipping");
    }

    #[test]
    fn test_path_separators() {
        assert_eq!(plain("C:\\\\Program Files\\\\Team Cherry\\\\HollowKnight.exe"), "Hollow Knight");
        assert_eq!(plain("/home/me/.wine/drive_c/Games/Celeste.exe"), "Celeste");
        assert_eq!(plain("Z:/mixed\\path/Hades.exe"), "Hades");
    }

    #[test]
    fn test_blacklist_wins_over_overrides() {
        let blacklist = set(&["steam"]);
        let overrides = map(&[("steam", "Steam Client")]);
        assert_eq!(resolve("C:\\Steam\\steam.exe", &blacklist, &overrides), "");
        assert_eq!(resolve("C:\\Steam\\Steam.exe", &blacklist, &overrides), "");
    }

    #[test]
    fn test_override_returned_verbatim() {
        let overrides = map(&[("hl2", "Half Life 2"), ("etg", "enter the GUNGEON")]);
        let none = HashSet::new();
        assert_eq!(resolve("hl2.exe", &none, &overrides), "Half Life 2");
        assert_eq!(resolve("EtG.exe", &none, &overrides), "enter the GUNGEON");
    }

    #[test]
    fn test_override_key_after_suffix_strip() {
        let overrides = map(&[("bbq", "The First Berserker Khazan")]);
        let none = HashSet::new();
        assert_eq!(
            resolve("BBQ-Win64-Shipping.exe", &none, &overrides),
            "The First Berserker Khazan"
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let blacklist = set(&["cmd"]);
        let overrides = map(&[("d2", "Diablo II")]);
        for _ in 0..3 {
            assert_eq!(resolve("D2.exe", &blacklist, &overrides), "Diablo II");
        }
    }

    #[test]
    fn test_exe_candidate() {
        assert_eq!(
            exe_candidate("  C:\\Program Files\\Game Dir\\Game.exe -windowed"),
            Some("C:\\Program Files\\Game Dir\\Game.exe")
        );
        assert_eq!(exe_candidate("wine64 C:\\x\\Hades.EXE"), Some("wine64 C:\\x\\Hades.EXE"));
        assert_eq!(exe_candidate("/usr/lib/crashpad_handler --no-rate-limit"), None);
    }

    #[test]
    fn test_exe_candidate_with_launcher_prefix_still_resolves() {
        let line = "wine64-preloader C:\\Games\\TheMessenger.exe";
        let candidate = exe_candidate(line).unwrap();
        assert_eq!(plain(candidate), "The Messenger");
    }
}
