//! The curated index of distribution build recipes `get`/`install` resolve
//! a bare `image[:tag]` argument against, modeled on the cloud-image preset
//! table this crate's ancestor shipped.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub label: &'static str,
    pub image: &'static str,
    pub tag: &'static str,
    pub url: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        label: "Ubuntu 24.04 LTS (Noble)",
        image: "ubuntu",
        tag: "noble",
        url: "https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64-root.tar.xz",
    },
    CatalogEntry {
        label: "Ubuntu 14.04 LTS (Trusty)",
        image: "ubuntu",
        tag: "trusty",
        url: "https://cloud-images.ubuntu.com/trusty/current/trusty-server-cloudimg-amd64-root.tar.gz",
    },
    CatalogEntry {
        label: "Debian 12 (Bookworm)",
        image: "debian",
        tag: "bookworm",
        url: "https://github.com/debuerreotype/docker-debian-artifacts/raw/dist-amd64/bookworm/rootfs.tar.xz",
    },
    CatalogEntry {
        label: "Debian 8 (Jessie)",
        image: "debian",
        tag: "jessie",
        url: "https://github.com/debuerreotype/docker-debian-artifacts/raw/dist-amd64/jessie/rootfs.tar.xz",
    },
    CatalogEntry {
        label: "Alpine Linux 3.21",
        image: "alpine",
        tag: "3.21",
        url: "https://dl-cdn.alpinelinux.org/alpine/v3.21/releases/x86_64/alpine-minirootfs-3.21.3-x86_64.tar.gz",
    },
    CatalogEntry {
        label: "Fedora 41",
        image: "fedora",
        tag: "41",
        url: "https://dl.fedoraproject.org/pub/fedora/linux/releases/41/Container/x86_64/images/Fedora-Container-Base-41.tar.xz",
    },
    CatalogEntry {
        label: "openSUSE Leap 15.6",
        image: "opensuse",
        tag: "15.6",
        url: "https://download.opensuse.org/distribution/leap/15.6/appliances/opensuse-leap-image.x86_64-lxc.tar.xz",
    },
];

const DEFAULT_TAG: &str = "latest";

/// Looks up `image` (case-insensitive) for `tag`, falling back to
/// `"latest"` when `tag` is `None` or empty. Each catalog image's first
/// entry stands in for `"latest"`.
pub fn resolve(image: &str, tag: Option<&str>) -> Option<&'static CatalogEntry> {
    let image = image.to_lowercase();
    let tag = tag.filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TAG);

    let matches: Vec<&CatalogEntry> = CATALOG
        .iter()
        .filter(|e| e.image.eq_ignore_ascii_case(&image))
        .collect();

    if tag == DEFAULT_TAG {
        return matches.first().copied();
    }

    matches
        .into_iter()
        .find(|e| e.tag.eq_ignore_ascii_case(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_image_and_tag() {
        let entry = resolve("ubuntu", Some("trusty")).unwrap();
        assert_eq!(entry.tag, "trusty");
    }

    #[test]
    fn defaults_to_latest_when_tag_omitted() {
        let entry = resolve("ubuntu", None).unwrap();
        assert_eq!(entry.tag, "noble");
    }

    #[test]
    fn is_case_insensitive() {
        assert!(resolve("UBUNTU", Some("NOBLE")).is_some());
    }

    #[test]
    fn unknown_image_returns_none() {
        assert!(resolve("nixos", None).is_none());
    }
}
