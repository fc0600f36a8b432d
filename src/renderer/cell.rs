/// Represents a 24-bit RGB color
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct RgbColor(pub u8, pub u8, pub u8);

impl RgbColor {
    /// Scales every channel by `factor` and floors.
    #[inline]
    pub fn dimmed(self, factor: f32) -> Self {
        let scale = |c: u8| (c as f32 * factor).floor() as u8;
        RgbColor(scale(self.0), scale(self.1), scale(self.2))
    }
}

/// One rendered glyph with the colour it should be drawn in
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct CellData {
    pub glyph: char,
    pub color: RgbColor,
}

impl Default for CellData {
    fn default() -> Self {
        Self {
            glyph: ' ',
            color: RgbColor::default(),
        }
    }
}

/// Colour-mode output token
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Token {
    Glyph(CellData),
    RowBreak,
}

#[derive(Clone, PartialEq, Debug)]
pub enum FrameBody {
    /// Rows joined with `'\n'`, one after the final row as well.
    Plain(String),
    Colored(Vec<Token>),
}

/// A whole frame of character art, row-delimited.
#[derive(Clone, PartialEq, Debug)]
pub struct RenderedFrame {
    pub width: usize,
    pub height: usize,
    pub body: FrameBody,
}

impl RenderedFrame {
    #[cfg(test)]
    pub fn is_colored(&self) -> bool {
        matches!(self.body, FrameBody::Colored(_))
    }

    #[cfg(test)]
    pub fn row_breaks(&self) -> usize {
        match &self.body {
            FrameBody::Plain(text) => text.matches('\n').count(),
            FrameBody::Colored(tokens) => tokens
                .iter()
                .filter(|t| matches!(t, Token::RowBreak))
                .count(),
        }
    }

    /// Glyph rows with colour stripped.
    #[cfg(test)]
    pub fn rows(&self) -> Vec<String> {
        match &self.body {
            FrameBody::Plain(text) => text.lines().map(str::to_owned).collect(),
            FrameBody::Colored(tokens) => {
                let mut rows = Vec::with_capacity(self.height);
                let mut current = String::with_capacity(self.width);
                for token in tokens {
                    match token {
                        Token::Glyph(cell) => current.push(cell.glyph),
                        Token::RowBreak => rows.push(std::mem::take(&mut current)),
                    }
                }
                rows
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimmed_floors_channels() {
        assert_eq!(RgbColor(255, 100, 0).dimmed(1.0), RgbColor(255, 100, 0));
        assert_eq!(RgbColor(255, 100, 3).dimmed(0.5), RgbColor(127, 50, 1));
        assert_eq!(RgbColor(255, 255, 255).dimmed(0.2), RgbColor(51, 51, 51));
    }

    #[test]
    fn test_colored_rows_strip_color() {
        let cell = |glyph| Token::Glyph(CellData { glyph, color: RgbColor(1, 2, 3) });
        let frame = RenderedFrame {
            width: 2,
            height: 2,
            body: FrameBody::Colored(vec![cell('a'), cell('b'), Token::RowBreak, cell('c'), cell('d'), Token::RowBreak]),
        };
        assert_eq!(frame.rows(), vec!["ab".to_string(), "cd".to_string()]);
        assert_eq!(frame.row_breaks(), 2);
        assert!(frame.is_colored());
    }
}
