//! Variant and rendition playlist handles.
//!
//! The [`VariantSet`] owns every playlist of a presentation. Streams and
//! switch requests only keep [`std::sync::Weak`] handles to them, so a
//! playlist lives exactly as long as the set that owns it.

use std::{collections::BTreeMap, sync::Arc};

use lyra_events::StreamKind;
use tracing::warn;

use crate::{HlsError, HlsResult};

/// Attributes of an alternate rendition (`EXT-X-MEDIA`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenditionInfo {
    pub kind: StreamKind,
    pub group_id: String,
    pub name: String,
    pub language: Option<String>,
    pub is_default: bool,
}

impl RenditionInfo {
    #[must_use]
    pub fn new(kind: StreamKind, group_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            group_id: group_id.into(),
            name: name.into(),
            language: None,
            is_default: false,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }
}

/// A media playlist streams read segments from.
///
/// Either a variant (main track at one bitrate) or an alternate rendition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPlaylist {
    uri: String,
    bandwidth: u32,
    audio_group: Option<String>,
    video_group: Option<String>,
    rendition: Option<RenditionInfo>,
}

impl MediaPlaylist {
    #[must_use]
    pub fn variant(uri: impl Into<String>, bandwidth: u32) -> Self {
        Self {
            uri: uri.into(),
            bandwidth,
            audio_group: None,
            video_group: None,
            rendition: None,
        }
    }

    /// Alternate rendition playlists carry no bandwidth of their own.
    #[must_use]
    pub fn rendition(uri: impl Into<String>, info: RenditionInfo) -> Self {
        Self {
            uri: uri.into(),
            bandwidth: 0,
            audio_group: None,
            video_group: None,
            rendition: Some(info),
        }
    }

    /// Audio rendition group this variant may switch into.
    #[must_use]
    pub fn with_audio_group(mut self, group: impl Into<String>) -> Self {
        self.audio_group = Some(group.into());
        self
    }

    /// Video rendition group this variant may switch into.
    #[must_use]
    pub fn with_video_group(mut self, group: impl Into<String>) -> Self {
        self.video_group = Some(group.into());
        self
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn bandwidth(&self) -> u32 {
        self.bandwidth
    }

    #[must_use]
    pub fn rendition_info(&self) -> Option<&RenditionInfo> {
        self.rendition.as_ref()
    }

    #[must_use]
    pub fn is_alternate_rendition(&self) -> bool {
        self.rendition.is_some()
    }

    #[must_use]
    pub fn rendition_group(&self, kind: StreamKind) -> Option<&str> {
        match kind {
            StreamKind::Audio => self.audio_group.as_deref(),
            StreamKind::Video => self.video_group.as_deref(),
        }
    }

    /// Rendition name, or the URI for variants.
    #[must_use]
    pub fn label(&self) -> &str {
        self.rendition
            .as_ref()
            .map_or(self.uri.as_str(), |r| r.name.as_str())
    }
}

/// Owner of the variants and alternate renditions of one presentation.
#[derive(Debug)]
pub struct VariantSet {
    variants: BTreeMap<u32, Arc<MediaPlaylist>>,
    renditions: Vec<Arc<MediaPlaylist>>,
}

impl VariantSet {
    /// Build the set from variant playlists. Duplicate bandwidths keep the
    /// first playlist.
    ///
    /// # Errors
    ///
    /// [`HlsError::NoVariants`] when `variants` is empty.
    pub fn new(variants: impl IntoIterator<Item = MediaPlaylist>) -> HlsResult<Self> {
        let mut map = BTreeMap::new();
        for playlist in variants {
            let bandwidth = playlist.bandwidth();
            if map.contains_key(&bandwidth) {
                warn!(bandwidth, uri = playlist.uri(), "duplicate variant bandwidth ignored");
                continue;
            }
            map.insert(bandwidth, Arc::new(playlist));
        }
        if map.is_empty() {
            return Err(HlsError::NoVariants);
        }
        Ok(Self {
            variants: map,
            renditions: Vec::new(),
        })
    }

    /// Attach alternate renditions.
    ///
    /// # Errors
    ///
    /// [`HlsError::NotARendition`] for a playlist without rendition info.
    pub fn with_renditions(
        mut self,
        renditions: impl IntoIterator<Item = MediaPlaylist>,
    ) -> HlsResult<Self> {
        for playlist in renditions {
            if !playlist.is_alternate_rendition() {
                return Err(HlsError::NotARendition(playlist.uri));
            }
            self.renditions.push(Arc::new(playlist));
        }
        Ok(self)
    }

    /// Variant bitrates, ascending.
    #[must_use]
    pub fn bitrates(&self) -> Vec<u32> {
        self.variants.keys().copied().collect()
    }

    #[must_use]
    pub fn get(&self, bandwidth: u32) -> Option<&Arc<MediaPlaylist>> {
        self.variants.get(&bandwidth)
    }

    #[must_use]
    pub fn lowest(&self) -> Option<&Arc<MediaPlaylist>> {
        self.variants.values().next()
    }

    pub fn renditions(&self, kind: StreamKind) -> impl Iterator<Item = &Arc<MediaPlaylist>> {
        self.renditions
            .iter()
            .filter(move |p| p.rendition_info().is_some_and(|r| r.kind == kind))
    }

    #[must_use]
    pub fn find_rendition(&self, kind: StreamKind, name: &str) -> Option<&Arc<MediaPlaylist>> {
        self.renditions(kind)
            .find(|p| p.rendition_info().is_some_and(|r| r.name == name))
    }

    /// Rendition of any kind owned by this set, matched by URI.
    #[must_use]
    pub fn find_rendition_by_uri(&self, uri: &str) -> Option<&Arc<MediaPlaylist>> {
        self.renditions.iter().find(|p| p.uri() == uri)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}
