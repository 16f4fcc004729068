//! Object classes and the catalog that resolves them.
//!
//! The catalog is the engine's counterpart of a module registry: it maps a
//! class name to the ports an instance of that class gets, and, for classes
//! that draw an interactive widget, which widget that is. Some classes have
//! a variable number of ports depending on their creation arguments
//! (`trigger`, `pack`, `route`, the radio buttons...). Those are resolved
//! against the parsed [`ObjectSpec`].

use std::collections::HashMap;

use super::object_spec::{Atom, ObjectSpec, TypeSymbol};
use PortKind::{Control as C, Signal as S};

/// Rate of an inlet or outlet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Message-rate port.
    Control,
    /// Audio-rate port.
    Signal,
}

impl PortKind {
    /// Signal outlets may only feed signal inlets; control outlets may feed
    /// either.
    pub fn can_connect_to(&self, target: PortKind) -> bool {
        !(*self == PortKind::Signal && target == PortKind::Control)
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            PortKind::Control => "control",
            PortKind::Signal => "signal",
        }
    }
}

/// Interactive widget drawn inside a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuiKind {
    Toggle,
    Bang,
    HorizontalRadio,
    VerticalRadio,
    HorizontalSlider,
    VerticalSlider,
    NumberBox,
    FloatAtom,
    SymbolAtom,
    ListBox,
    Message,
    Comment,
    Subpatch,
    GraphOnParent,
    Array,
}

impl GuiKind {
    /// Argument position holding the widget label, if the class has one.
    pub fn label_argument(&self) -> Option<usize> {
        match self {
            GuiKind::Toggle => Some(4),
            GuiKind::Bang | GuiKind::HorizontalRadio | GuiKind::VerticalRadio => Some(6),
            GuiKind::HorizontalSlider | GuiKind::VerticalSlider | GuiKind::NumberBox => Some(8),
            _ => None,
        }
    }
}

/// Fully resolved class of one object instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectClass {
    /// Class name as typed (`osc~`, `msg`, `tgl`...).
    pub name: String,
    /// Inlet kinds, in port order.
    pub inlets: Vec<PortKind>,
    /// Outlet kinds, in port order.
    pub outlets: Vec<PortKind>,
    /// Widget drawn inside the box, if any.
    pub gui: Option<GuiKind>,
    /// The class name was not found; the object has no ports.
    pub broken: bool,
}

impl ObjectClass {
    fn broken(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inlets: Vec::new(),
            outlets: Vec::new(),
            gui: None,
            broken: true,
        }
    }

    /// Whether this is a subpatch that owns a child patch.
    pub fn is_subpatch(&self) -> bool {
        matches!(
            self.gui,
            Some(GuiKind::Subpatch) | Some(GuiKind::GraphOnParent) | Some(GuiKind::Array)
        )
    }
}

/// Static description of a fixed-arity class.
#[derive(Clone, Debug)]
struct ClassTemplate {
    inlets: Vec<PortKind>,
    outlets: Vec<PortKind>,
    gui: Option<GuiKind>,
}

/// Central catalog of object classes known to the engine.
pub struct ObjectCatalog {
    /// Map of class name to its template.
    classes: HashMap<String, ClassTemplate>,
    /// Alternative spellings of registered classes (`t` for `trigger`).
    aliases: HashMap<String, String>,
}

impl ObjectCatalog {
    /// Creates an empty catalog. Only typed boxes (messages, atoms,
    /// comments) resolve against it.
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Creates a catalog with the built-in classes registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        // Signal objects
        catalog.register("osc~", &[S, C], &[S], None);
        catalog.register("phasor~", &[S, C], &[S], None);
        catalog.register("noise~", &[C], &[S], None);
        catalog.register("*~", &[S, S], &[S], None);
        catalog.register("+~", &[S, S], &[S], None);
        catalog.register("-~", &[S, S], &[S], None);
        catalog.register("/~", &[S, S], &[S], None);
        catalog.register("lop~", &[S, C], &[S], None);
        catalog.register("hip~", &[S, C], &[S], None);
        catalog.register("vcf~", &[S, S, C], &[S, S], None);
        catalog.register("line~", &[C, C], &[S], None);
        catalog.register("sig~", &[C], &[S], None);
        catalog.register("snapshot~", &[S], &[C], None);
        catalog.register("dac~", &[S, S], &[], None);
        catalog.register("adc~", &[C], &[S, S], None);
        catalog.register("inlet~", &[], &[S], None);
        catalog.register("outlet~", &[S], &[], None);

        // Control objects
        catalog.register("metro", &[C, C], &[C], None);
        catalog.register("delay", &[C, C], &[C], None);
        catalog.register("line", &[C, C, C], &[C], None);
        catalog.register("+", &[C, C], &[C], None);
        catalog.register("-", &[C, C], &[C], None);
        catalog.register("*", &[C, C], &[C], None);
        catalog.register("/", &[C, C], &[C], None);
        catalog.register("mtof", &[C], &[C], None);
        catalog.register("f", &[C, C], &[C], None);
        catalog.register("i", &[C, C], &[C], None);
        catalog.register("print", &[C], &[], None);
        catalog.register("loadbang", &[C], &[C], None);
        catalog.register("spigot", &[C, C], &[C], None);
        catalog.register("send", &[C, C], &[], None);
        catalog.register("receive", &[C], &[C], None);
        catalog.register("inlet", &[], &[C], None);
        catalog.register("outlet", &[C], &[], None);
        catalog.register("trigger", &[C], &[C, C], None);
        catalog.register("pack", &[C, C], &[C], None);
        catalog.register("unpack", &[C], &[C, C], None);
        catalog.register("route", &[C, C], &[C, C], None);
        catalog.register("select", &[C, C], &[C, C], None);

        catalog.alias("t", "trigger");
        catalog.alias("sel", "select");
        catalog.alias("del", "delay");
        catalog.alias("s", "send");
        catalog.alias("r", "receive");
        catalog.alias("float", "f");
        catalog.alias("int", "i");

        // Widgets
        catalog.register("tgl", &[C], &[C], Some(GuiKind::Toggle));
        catalog.register("bng", &[C], &[C], Some(GuiKind::Bang));
        catalog.register("hradio", &[C], &[C], Some(GuiKind::HorizontalRadio));
        catalog.register("vradio", &[C], &[C], Some(GuiKind::VerticalRadio));
        catalog.register("hsl", &[C], &[C], Some(GuiKind::HorizontalSlider));
        catalog.register("vsl", &[C], &[C], Some(GuiKind::VerticalSlider));
        catalog.register("nbx", &[C], &[C], Some(GuiKind::NumberBox));

        // Containers; ports come from the child patch
        catalog.register("pd", &[], &[], Some(GuiKind::Subpatch));
        catalog.register("graph", &[], &[], Some(GuiKind::GraphOnParent));

        catalog
    }

    /// Registers a fixed class.
    ///
    /// # Panics
    ///
    /// Panics if a class with the same name is already registered.
    pub fn register(
        &mut self,
        name: &str,
        inlets: &[PortKind],
        outlets: &[PortKind],
        gui: Option<GuiKind>,
    ) {
        if self.classes.contains_key(name) {
            panic!("Class '{}' is already registered", name);
        }

        self.classes.insert(
            name.to_string(),
            ClassTemplate {
                inlets: inlets.to_vec(),
                outlets: outlets.to_vec(),
                gui,
            },
        );
    }

    /// Registers an alternative spelling for an existing class.
    pub fn alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    /// Returns true if the class name (or an alias of it) is known.
    pub fn contains(&self, name: &str) -> bool {
        self.canonical(name).is_some()
    }

    /// Returns the number of registered classes (aliases excluded).
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if the catalog has no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Name of the help patch for a class, `None` for unknown classes.
    pub fn help_name(&self, name: &str) -> Option<String> {
        self.canonical(name).map(|canonical| format!("{}-help", canonical))
    }

    fn canonical<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.classes.contains_key(name) {
            return Some(name);
        }
        self.aliases
            .get(name)
            .map(String::as_str)
            .filter(|target| self.classes.contains_key(*target))
    }

    /// Resolves a specification to the class an instance of it gets.
    ///
    /// Unknown class names resolve to a broken class without ports; the
    /// object is still created so the text is kept.
    pub fn resolve(&self, spec: &ObjectSpec) -> ObjectClass {
        match spec.type_symbol {
            TypeSymbol::Message => return fixed("msg", &[C], &[C], GuiKind::Message),
            TypeSymbol::Comment => {
                return ObjectClass {
                    name: "comment".to_string(),
                    inlets: Vec::new(),
                    outlets: Vec::new(),
                    gui: Some(GuiKind::Comment),
                    broken: false,
                }
            }
            TypeSymbol::FloatAtom => return fixed("floatatom", &[C], &[C], GuiKind::FloatAtom),
            TypeSymbol::SymbolAtom => return fixed("symbolatom", &[C], &[C], GuiKind::SymbolAtom),
            TypeSymbol::ListBox => return fixed("listbox", &[C], &[C], GuiKind::ListBox),
            TypeSymbol::Object => {}
        }

        let name = spec.class_name().unwrap_or_default();
        let Some(canonical) = self.canonical(&name) else {
            return ObjectClass::broken(&name);
        };
        let Some(template) = self.classes.get(canonical) else {
            return ObjectClass::broken(&name);
        };

        let args = spec.arguments();
        let mut class = ObjectClass {
            name: name.clone(),
            inlets: template.inlets.clone(),
            outlets: template.outlets.clone(),
            gui: template.gui,
            broken: false,
        };

        match canonical {
            "trigger" => {
                class.outlets = vec![C; args.len().max(2)];
            }
            "pack" => {
                class.inlets = vec![C; args.len().max(2)];
            }
            "unpack" => {
                class.outlets = vec![C; args.len().max(2)];
            }
            "route" | "select" => {
                let count = args.len().max(1);
                class.outlets = vec![C; count + 1];
                // A single argument leaves the right inlet to change it
                class.inlets = if count == 1 { vec![C, C] } else { vec![C] };
            }
            "graph" if args.len() >= 2 => {
                // `graph name size` holds an array
                class.gui = Some(GuiKind::Array);
            }
            _ => {}
        }

        class
    }
}

impl Default for ObjectCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn fixed(name: &str, inlets: &[PortKind], outlets: &[PortKind], gui: GuiKind) -> ObjectClass {
    ObjectClass {
        name: name.to_string(),
        inlets: inlets.to_vec(),
        outlets: outlets.to_vec(),
        gui: Some(gui),
        broken: false,
    }
}

/// Reads a numeric creation argument, falling back to `default`.
pub fn float_arg(args: &[Atom], index: usize, default: f32) -> f32 {
    args.get(index).and_then(Atom::as_float).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(text: &str) -> ObjectClass {
        ObjectCatalog::with_builtins().resolve(&ObjectSpec::parse(text))
    }

    #[test]
    fn test_port_kind_rules() {
        assert!(C.can_connect_to(C));
        assert!(C.can_connect_to(S));
        assert!(S.can_connect_to(S));
        assert!(!S.can_connect_to(C));
    }

    #[test]
    fn test_fixed_class() {
        let class = resolve("osc~ 440");
        assert_eq!(class.inlets, vec![S, C]);
        assert_eq!(class.outlets, vec![S]);
        assert!(!class.broken);
        assert_eq!(class.gui, None);
    }

    #[test]
    fn test_unknown_class_is_broken() {
        let class = resolve("nonexistent~ 1 2");
        assert!(class.broken);
        assert!(class.inlets.is_empty());
        assert!(class.outlets.is_empty());
        assert_eq!(class.name, "nonexistent~");
    }

    #[test]
    fn test_variable_arity() {
        assert_eq!(resolve("t b b f").outlets.len(), 3);
        assert_eq!(resolve("trigger").outlets.len(), 2);
        assert_eq!(resolve("pack 0 0 0 0").inlets.len(), 4);
        assert_eq!(resolve("unpack f f f").outlets.len(), 3);

        let route = resolve("route a b c");
        assert_eq!(route.outlets.len(), 4);
        assert_eq!(route.inlets.len(), 1);

        let sel = resolve("sel 5");
        assert_eq!(sel.outlets.len(), 2);
        assert_eq!(sel.inlets.len(), 2);
    }

    #[test]
    fn test_typed_boxes() {
        let msg = resolve("msg 1 2 3");
        assert_eq!(msg.gui, Some(GuiKind::Message));
        assert_eq!(msg.inlets.len(), 1);

        let comment = resolve("comment hello");
        assert_eq!(comment.gui, Some(GuiKind::Comment));
        assert!(comment.inlets.is_empty());

        assert_eq!(resolve("floatatom").gui, Some(GuiKind::FloatAtom));
    }

    #[test]
    fn test_graph_variants() {
        assert_eq!(resolve("graph").gui, Some(GuiKind::GraphOnParent));
        assert_eq!(resolve("graph table1 100").gui, Some(GuiKind::Array));
        assert!(resolve("pd sub").is_subpatch());
        assert!(!resolve("tgl").is_subpatch());
    }

    #[test]
    fn test_aliases_and_help() {
        let catalog = ObjectCatalog::with_builtins();
        assert!(catalog.contains("t"));
        assert!(catalog.contains("trigger"));
        assert!(!catalog.contains("bogus"));
        assert_eq!(catalog.help_name("t").as_deref(), Some("trigger-help"));
        assert_eq!(catalog.help_name("bogus"), None);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration_panics() {
        let mut catalog = ObjectCatalog::new();
        catalog.register("x", &[], &[], None);
        catalog.register("x", &[], &[], None);
    }

    #[test]
    fn test_label_argument() {
        assert_eq!(GuiKind::Toggle.label_argument(), Some(4));
        assert_eq!(GuiKind::Message.label_argument(), None);
    }
}
