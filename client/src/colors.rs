/// Format RGBA as a CSS color string.
pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}

/// CSS color for a linear `[0, 1]` triple, as used by the tile palette.
pub fn unit_rgb_css(rgb: [f32; 3], alpha: f64) -> String {
    let [r, g, b] = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    rgba_css(r, g, b, alpha)
}
