//! Embedded widgets of GUI objects.
//!
//! Every widget kind the canvas knows is a variant of [`GuiWidget`]. The
//! shared capabilities (actuation while the patch is locked, parameter
//! listing for the sidebar) are plain methods matching on the variant.

use egui::Vec2;

use crate::engine::object_class::float_arg;
use crate::engine::{GuiKind, GuiState, ObjectInfo, ObjectSpec};

use super::sidebar::ObjectParameter;

/// Widget state mirrored from the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum GuiWidget {
    Toggle {
        on: bool,
        /// Value sent when switched on.
        nonzero: f32,
        /// Set while the pointer stays on the widget after toggling it.
        latched: bool,
    },
    Bang {
        latched: bool,
    },
    Radio {
        vertical: bool,
        count: usize,
        selected: usize,
    },
    Slider {
        vertical: bool,
        min: f32,
        max: f32,
        value: f32,
    },
    NumberBox {
        value: f32,
    },
    Atom {
        symbol: bool,
        value: f32,
    },
    Message,
    Comment,
    Subpatch {
        graph: bool,
    },
    Array,
}

impl GuiWidget {
    /// The widget for an object, if its class has one.
    pub fn from_info(info: &ObjectInfo) -> Option<Self> {
        let state = info.gui.as_ref()?;
        let spec = ObjectSpec::parse(&info.text);
        let args = spec.arguments();

        let widget = match state.kind {
            GuiKind::Toggle => GuiWidget::Toggle {
                on: state.value != 0.0,
                nonzero: if state.value != 0.0 {
                    state.value
                } else {
                    float_arg(args, 13, 1.0)
                },
                latched: false,
            },
            GuiKind::Bang => GuiWidget::Bang { latched: false },
            GuiKind::HorizontalRadio | GuiKind::VerticalRadio => GuiWidget::Radio {
                vertical: state.kind == GuiKind::VerticalRadio,
                count: state.radio_count,
                selected: state.value.max(0.0) as usize,
            },
            GuiKind::HorizontalSlider | GuiKind::VerticalSlider => GuiWidget::Slider {
                vertical: state.kind == GuiKind::VerticalSlider,
                min: float_arg(args, 2, 0.0),
                max: float_arg(args, 3, 127.0),
                value: state.value,
            },
            GuiKind::NumberBox => GuiWidget::NumberBox { value: state.value },
            GuiKind::FloatAtom | GuiKind::ListBox => GuiWidget::Atom {
                symbol: false,
                value: state.value,
            },
            GuiKind::SymbolAtom => GuiWidget::Atom {
                symbol: true,
                value: state.value,
            },
            GuiKind::Message => GuiWidget::Message,
            GuiKind::Comment => GuiWidget::Comment,
            GuiKind::Subpatch => GuiWidget::Subpatch { graph: false },
            GuiKind::GraphOnParent => GuiWidget::Subpatch { graph: true },
            GuiKind::Array => GuiWidget::Array,
        };
        Some(widget)
    }

    /// Takes the engine's current value.
    pub fn update(&mut self, state: &GuiState) {
        match self {
            GuiWidget::Toggle { on, nonzero, .. } => {
                *on = state.value != 0.0;
                if state.value != 0.0 {
                    *nonzero = state.value;
                }
            }
            GuiWidget::Radio { count, selected, .. } => {
                *count = state.radio_count;
                *selected = state.value.max(0.0) as usize;
            }
            GuiWidget::Slider { value, .. }
            | GuiWidget::NumberBox { value }
            | GuiWidget::Atom { value, .. } => *value = state.value,
            _ => {}
        }
    }

    /// Whether dragging over the widget in a locked patch actuates it.
    pub fn is_toggle_like(&self) -> bool {
        matches!(
            self,
            GuiWidget::Toggle { .. }
                | GuiWidget::Bang { .. }
                | GuiWidget::Radio { .. }
                | GuiWidget::Slider { .. }
        )
    }

    /// Actuates the widget at `at`, the pointer position as a fraction of
    /// the box size. Returns the value to send to the engine, if any.
    ///
    /// Toggles and bangs fire once until [`untoggle_object`](Self::untoggle_object).
    pub fn toggle_object(&mut self, at: Vec2) -> Option<f32> {
        match self {
            GuiWidget::Toggle {
                on,
                nonzero,
                latched,
            } => {
                if *latched {
                    return None;
                }
                *latched = true;
                *on = !*on;
                Some(if *on { *nonzero } else { 0.0 })
            }
            GuiWidget::Bang { latched } => {
                if *latched {
                    return None;
                }
                *latched = true;
                Some(1.0)
            }
            GuiWidget::Radio {
                vertical,
                count,
                selected,
            } => {
                let fraction = if *vertical { at.y } else { at.x };
                let last = count.saturating_sub(1);
                let index = ((fraction.clamp(0.0, 1.0) * *count as f32) as usize).min(last);
                if index == *selected {
                    return None;
                }
                *selected = index;
                Some(index as f32)
            }
            GuiWidget::Slider {
                vertical,
                min,
                max,
                value,
            } => {
                // Vertical sliders grow upwards
                let fraction = if *vertical { 1.0 - at.y } else { at.x };
                let next = *min + (*max - *min) * fraction.clamp(0.0, 1.0);
                if next == *value {
                    return None;
                }
                *value = next;
                Some(next)
            }
            _ => None,
        }
    }

    /// Releases a latched toggle or bang.
    pub fn untoggle_object(&mut self) {
        match self {
            GuiWidget::Toggle { latched, .. } | GuiWidget::Bang { latched } => *latched = false,
            _ => {}
        }
    }

    /// Parameters shown in the sidebar.
    pub fn parameters(&self) -> Vec<ObjectParameter> {
        match self {
            GuiWidget::Toggle { on, nonzero, .. } => vec![
                ObjectParameter::new("nonzero", nonzero),
                ObjectParameter::new("value", if *on { *nonzero } else { 0.0 }),
            ],
            GuiWidget::Radio { count, selected, .. } => vec![
                ObjectParameter::new("options", count),
                ObjectParameter::new("value", selected),
            ],
            GuiWidget::Slider { min, max, value, .. } => vec![
                ObjectParameter::new("minimum", min),
                ObjectParameter::new("maximum", max),
                ObjectParameter::new("value", value),
            ],
            GuiWidget::NumberBox { value } | GuiWidget::Atom { value, symbol: false } => {
                vec![ObjectParameter::new("value", value)]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::vec2;

    fn toggle() -> GuiWidget {
        GuiWidget::Toggle {
            on: false,
            nonzero: 1.0,
            latched: false,
        }
    }

    #[test]
    fn test_toggle_latches_until_released() {
        let mut widget = toggle();
        assert_eq!(widget.toggle_object(vec2(0.5, 0.5)), Some(1.0));
        assert_eq!(widget.toggle_object(vec2(0.5, 0.5)), None);

        widget.untoggle_object();
        assert_eq!(widget.toggle_object(vec2(0.5, 0.5)), Some(0.0));
    }

    #[test]
    fn test_bang_fires_once() {
        let mut widget = GuiWidget::Bang { latched: false };
        assert_eq!(widget.toggle_object(Vec2::ZERO), Some(1.0));
        assert_eq!(widget.toggle_object(Vec2::ZERO), None);
        widget.untoggle_object();
        assert_eq!(widget.toggle_object(Vec2::ZERO), Some(1.0));
    }

    #[test]
    fn test_radio_picks_button_under_pointer() {
        let mut widget = GuiWidget::Radio {
            vertical: false,
            count: 4,
            selected: 0,
        };
        assert_eq!(widget.toggle_object(vec2(0.6, 0.5)), Some(2.0));
        assert_eq!(widget.toggle_object(vec2(0.7, 0.5)), None);
        assert_eq!(widget.toggle_object(vec2(1.0, 0.5)), Some(3.0));
    }

    #[test]
    fn test_slider_maps_range() {
        let mut widget = GuiWidget::Slider {
            vertical: true,
            min: 0.0,
            max: 100.0,
            value: 0.0,
        };
        assert_eq!(widget.toggle_object(vec2(0.5, 0.25)), Some(75.0));
    }

    #[test]
    fn test_update_from_engine() {
        let mut widget = toggle();
        widget.update(&GuiState {
            kind: GuiKind::Toggle,
            value: 5.0,
            radio_count: 8,
            label: None,
        });
        assert_eq!(
            widget,
            GuiWidget::Toggle {
                on: true,
                nonzero: 5.0,
                latched: false
            }
        );
    }

    #[test]
    fn test_parameters() {
        assert_eq!(toggle().parameters().len(), 2);
        assert!(GuiWidget::Comment.parameters().is_empty());
        assert!(!GuiWidget::Comment.is_toggle_like());
    }
}
