// SPDX-License-Identifier: GPL-3.0-only

//! Device name, label and mountpoint rules

const MAX_NAME_LEN: usize = 127;

const LV_RESERVED_PREFIXES: [&str; 2] = ["snapshot", "pvmove"];
const LV_RESERVED_SUFFIXES: [&str; 11] = [
    "_cdata", "_cmeta", "_corig", "_mlog", "_mimage", "_pmspare", "_rimage", "_rmeta", "_tdata",
    "_tmeta", "_vorigin",
];

const VFAT_FORBIDDEN: &[char] = &[
    '*', '?', '.', ',', ';', ':', '/', '\\', '|', '+', '=', '<', '>', '[', ']', '"',
];

/// Volume group name
pub fn is_valid_vg_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('-')
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-'))
}

/// Logical volume name
pub fn is_valid_lv_name(name: &str) -> bool {
    is_valid_vg_name(name)
        && !LV_RESERVED_PREFIXES.iter().any(|p| name.starts_with(p))
        && !LV_RESERVED_SUFFIXES.iter().any(|s| name.contains(s))
}

/// MD array, Btrfs volume or subvolume name
pub fn is_valid_generic_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_NAME_LEN
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c == '/' || c == '\0' || c.is_whitespace())
}

/// Label valid for the given filesystem
pub fn is_valid_label(fs: &str, label: &str) -> bool {
    match fs {
        "ext2" | "ext3" | "ext4" => label.len() <= 16,
        "xfs" => label.len() <= 12 && !label.contains(' '),
        "vfat" | "fat" | "efi" => {
            label.chars().count() <= 11
                && label.is_ascii()
                && !label.contains(VFAT_FORBIDDEN)
        }
        "btrfs" => label.len() <= 255,
        "swap" => label.len() <= 15,
        "ntfs" => label.chars().count() <= 128,
        _ => false,
    }
}

pub fn is_absolute_mountpoint(mountpoint: &str) -> bool {
    mountpoint.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vg_names() {
        assert!(is_valid_vg_name("fedora_root"));
        assert!(is_valid_vg_name("vg.data+1"));
        assert!(!is_valid_vg_name(""));
        assert!(!is_valid_vg_name("-vg"));
        assert!(!is_valid_vg_name(".."));
        assert!(!is_valid_vg_name("my vg"));
        assert!(!is_valid_vg_name(&"a".repeat(128)));
    }

    #[test]
    fn lv_names_reject_reserved_parts() {
        assert!(is_valid_lv_name("home"));
        assert!(!is_valid_lv_name("snapshot1"));
        assert!(!is_valid_lv_name("pvmove0"));
        assert!(!is_valid_lv_name("data_tmeta"));
        assert!(!is_valid_lv_name("x_rimage_0"));
    }

    #[test]
    fn generic_names() {
        assert!(is_valid_generic_name("md-data"));
        assert!(!is_valid_generic_name("a/b"));
        assert!(!is_valid_generic_name("a b"));
        assert!(!is_valid_generic_name("."));
    }

    #[test]
    fn labels_by_filesystem() {
        assert!(is_valid_label("ext4", "sixteen_chars_ok"));
        assert!(!is_valid_label("ext4", "seventeen_chars_x"));
        assert!(!is_valid_label("xfs", "has space"));
        assert!(is_valid_label("vfat", "EFI"));
        assert!(!is_valid_label("vfat", "A.B"));
        assert!(!is_valid_label("vfat", "ŁABEL"));
        assert!(!is_valid_label("zfs", "pool"));
    }
}
