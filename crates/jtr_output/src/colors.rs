/// Escape sequences to wrap highlighted output in. [ColorProvider::CMD] spells them out, for
/// snapshot tests.
pub struct ColorProvider {
    pub green_bold: &'static str,
    pub red_bold: &'static str,
    pub yellow_bold: &'static str,
    pub bold: &'static str,
    pub reset: &'static str,
}

impl ColorProvider {
    pub const ANSI: Self = Self {
        green_bold: "\x1B[32;1m",
        red_bold: "\x1B[31;1m",
        yellow_bold: "\x1B[33;1m",
        bold: "\x1B[1m",
        reset: "\x1B[0m",
    };

    pub const NOCOLOR: Self = Self {
        green_bold: "",
        red_bold: "",
        yellow_bold: "",
        bold: "",
        reset: "",
    };

    pub const CMD: Self = Self {
        green_bold: "<green-bold>",
        red_bold: "<red-bold>",
        yellow_bold: "<yellow-bold>",
        bold: "<bold>",
        reset: "<reset>",
    };

    pub fn new(use_color: bool) -> &'static Self {
        if use_color {
            &Self::ANSI
        } else {
            &Self::NOCOLOR
        }
    }
}
