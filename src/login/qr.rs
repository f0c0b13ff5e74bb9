// Terminal rendering of the login QR code

use qrcode::render::unicode;
use qrcode::types::QrError;
use qrcode::QrCode;

/// Render `payload` as a QR code made of half-block characters.
///
/// Colors are inverted for dark terminal backgrounds; the quiet zone is kept
/// so phone cameras can lock on.
pub fn render_terminal(payload: &str) -> Result<String, QrError> {
    let code = QrCode::new(payload.as_bytes())?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_login_url() {
        let text = render_terminal(
            "https://account.bilibili.com/h5/account-h5/auth/scan-web?navhide=1&qrcode_key=abc",
        )
        .unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.len() > 10);
        // square module grid: every row has the same width
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }
}
