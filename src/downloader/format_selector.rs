// FormatSelector - turns engine formats into selectable options
//
// Rules:
// - engine order is reversed (engines list the best formats last)
// - audio-only entries (vcodec == "none") are skipped
// - entries without a known height are skipped
// - duplicates are kept: the engine may report several streams per resolution

use super::models::{EngineFormat, FormatDescriptor};

/// Default ladder when the user did not pick a format: MP4 with matching
/// M4A audio, then single-file MP4, then whatever is best.
pub const DEFAULT_FORMAT_SPEC: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

pub struct FormatSelector;

impl FormatSelector {
    /// Build the selectable format list from the engine's format list
    pub fn build_options(formats: &[EngineFormat]) -> Vec<FormatDescriptor> {
        formats
            .iter()
            .rev()
            .filter(|f| f.has_video())
            .filter_map(|f| {
                let height = f.height?;
                let size = f.effective_size();
                Some(FormatDescriptor {
                    format_id: f.format_id.clone(),
                    height_pixels: Some(height),
                    container_ext: f.ext.clone(),
                    approx_size_bytes: size,
                    display_label: Self::label(height, f.format_note.as_deref(), &f.ext, size),
                })
            })
            .collect()
    }

    /// e.g. "1080P - 1080P 高清 (mp4) - 152.3MB"
    fn label(height: u32, note: Option<&str>, ext: &str, size: Option<u64>) -> String {
        let mut label = format!("{}P - {} ({})", height, note.unwrap_or(""), ext);
        if let Some(bytes) = size.filter(|b| *b > 0) {
            label.push_str(&format!(" - {:.1}MB", bytes as f64 / 1024.0 / 1024.0));
        }
        label
    }

    /// Format-selection expression for the engine
    pub fn format_spec(format_id: Option<&str>) -> String {
        match format_id {
            Some(id) => format!("{}+bestaudio/best", id),
            None => DEFAULT_FORMAT_SPEC.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_video_format(id: &str, height: Option<u32>, size: Option<u64>) -> EngineFormat {
        EngineFormat {
            format_id: id.to_string(),
            ext: "mp4".to_string(),
            height,
            vcodec: Some("avc1.640032".to_string()),
            acodec: Some("none".to_string()),
            format_note: height.map(|h| format!("{}P", h)),
            filesize: None,
            filesize_approx: size,
        }
    }

    fn make_audio_format(id: &str) -> EngineFormat {
        EngineFormat {
            format_id: id.to_string(),
            ext: "m4a".to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_reversed_then_filtered() {
        let formats = vec![
            make_video_format("1080", Some(1080), None),
            make_video_format("720", Some(720), None),
            make_video_format("unknown", None, None),
        ];
        let options = FormatSelector::build_options(&formats);
        let ids: Vec<&str> = options.iter().map(|o| o.format_id.as_str()).collect();
        assert_eq!(ids, vec!["720", "1080"]);
    }

    #[test]
    fn test_audio_only_is_skipped() {
        let formats = vec![make_audio_format("30280"), make_video_format("30064", Some(720), None)];
        let options = FormatSelector::build_options(&formats);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].format_id, "30064");
    }

    #[test]
    fn test_missing_vcodec_counts_as_video() {
        let mut f = make_video_format("flv", Some(480), None);
        f.vcodec = None;
        assert_eq!(FormatSelector::build_options(&[f]).len(), 1);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let formats = vec![
            make_video_format("30080", Some(1080), None),
            make_video_format("100026", Some(1080), None),
        ];
        let options = FormatSelector::build_options(&formats);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].display_label, options[1].display_label);
    }

    #[test]
    fn test_label_with_size() {
        let formats = vec![make_video_format("30080", Some(1080), Some(157_286_400))];
        let options = FormatSelector::build_options(&formats);
        assert_eq!(options[0].display_label, "1080P - 1080P (mp4) - 150.0MB");
        assert_eq!(options[0].approx_size_bytes, Some(157_286_400));
    }

    #[test]
    fn test_label_without_size_or_note() {
        let mut f = make_video_format("16", Some(360), None);
        f.format_note = None;
        let options = FormatSelector::build_options(&[f]);
        assert_eq!(options[0].display_label, "360P -  (mp4)");
    }

    #[test]
    fn test_format_spec() {
        assert_eq!(FormatSelector::format_spec(Some("30080")), "30080+bestaudio/best");
        assert_eq!(FormatSelector::format_spec(None), DEFAULT_FORMAT_SPEC);
    }
}
