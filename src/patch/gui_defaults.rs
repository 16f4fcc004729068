//! Default argument templates for GUI objects.
//!
//! Typing a bare `tgl` or `hsl` gives a widget sized and coloured for the
//! canvas instead of the engine's tiny defaults. Templates contain the
//! placeholders `bgColour`, `fgColour` and `lblColour`, which are replaced
//! with the current theme colours when the object is created.

use std::collections::BTreeMap;

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("tgl", "25 0 empty empty empty 17 7 0 10 bgColour fgColour lblColour 0 1"),
    ("bng", "25 250 50 0 empty empty empty 17 7 0 10 bgColour fgColour lblColour"),
    ("hsl", "128 17 0 127 0 0 empty empty empty -2 -8 0 10 bgColour fgColour lblColour 0 1"),
    ("vsl", "17 128 0 127 0 0 empty empty empty 0 -9 0 10 bgColour fgColour lblColour 0 1"),
    ("hradio", "20 1 0 8 empty empty empty 0 -8 0 10 bgColour fgColour lblColour 0"),
    ("vradio", "20 1 0 8 empty empty empty 0 -8 0 10 bgColour fgColour lblColour 0"),
    ("nbx", "4 18 -1e+37 1e+37 0 0 empty empty empty 0 -8 0 10 bgColour fgColour lblColour 0 256"),
];

/// Colours substituted into templates, as RGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemplateColours {
    pub background: [u8; 3],
    pub foreground: [u8; 3],
}

impl TemplateColours {
    /// Label colour: black or white, whichever reads better on the background.
    pub fn label(&self) -> [u8; 3] {
        let [r, g, b] = self.background;
        let luminance = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        if luminance > 127.5 {
            [0, 0, 0]
        } else {
            [255, 255, 255]
        }
    }
}

impl Default for TemplateColours {
    fn default() -> Self {
        Self {
            background: [35, 35, 55],
            foreground: [240, 240, 245],
        }
    }
}

fn hex([r, g, b]: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Template table keyed by class name.
#[derive(Clone, Debug, PartialEq)]
pub struct GuiDefaults {
    templates: BTreeMap<String, String>,
}

impl GuiDefaults {
    /// The built-in templates.
    pub fn new() -> Self {
        Self {
            templates: BUILTIN_TEMPLATES
                .iter()
                .map(|(class, template)| (class.to_string(), template.to_string()))
                .collect(),
        }
    }

    /// The built-in templates with `overrides` layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut defaults = Self::new();
        for (class, template) in overrides {
            defaults.templates.insert(class.clone(), template.clone());
        }
        defaults
    }

    pub fn template(&self, class: &str) -> Option<&str> {
        self.templates.get(class).map(String::as_str)
    }

    /// Expands `text` if it is a bare class name with a template.
    ///
    /// Text that already carries arguments is left alone so that pasted or
    /// retyped widgets keep their own settings.
    pub fn apply(&self, text: &str, colours: &TemplateColours) -> String {
        let mut tokens = text.split_whitespace();
        let (Some(class), None) = (tokens.next(), tokens.next()) else {
            return text.to_string();
        };
        let Some(template) = self.template(class) else {
            return text.to_string();
        };

        let arguments = template
            .replace("bgColour", &hex(colours.background))
            .replace("fgColour", &hex(colours.foreground))
            .replace("lblColour", &hex(colours.label()));
        format!("{} {}", class, arguments)
    }
}

impl Default for GuiDefaults {
    fn default() -> Self {
        Self::new()
    }
}
