use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Shape {
    Statement,
    Expression,
    Hybrid,
}

impl Shape {
    pub fn fits_statement(self) -> bool {
        matches!(self, Shape::Statement | Shape::Hybrid)
    }

    pub fn fits_value(self) -> bool {
        matches!(self, Shape::Expression | Shape::Hybrid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldKind {
    Text,
    Number,
    Choice(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SlotKind {
    Value,
    Statement,
    Literal(FieldKind),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub id: String,
    pub kind: SlotKind,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSchema {
    pub type_id: String,
    pub shape: Shape,
    pub slots: Vec<Slot>,
    pub has_next: bool,
    pub category: String,
    pub tooltip: String,
    /// Block colour as a hue; `None` inherits the category colour.
    pub hue: Option<u16>,
}

impl BlockSchema {
    pub fn new(type_id: impl Into<String>, shape: Shape) -> Self {
        Self {
            type_id: type_id.into(),
            shape,
            slots: Vec::new(),
            has_next: shape.fits_statement(),
            category: String::new(),
            tooltip: String::new(),
            hue: None,
        }
    }

    pub fn statement(type_id: impl Into<String>) -> Self {
        Self::new(type_id, Shape::Statement)
    }

    pub fn expression(type_id: impl Into<String>) -> Self {
        Self::new(type_id, Shape::Expression)
    }

    pub fn value(mut self, id: &str, default: &str) -> Self {
        self.push(id, SlotKind::Value, Some(default));
        self
    }

    /// A value slot whose absence is meaningful to the rule (no default text).
    pub fn optional_value(mut self, id: &str) -> Self {
        self.push(id, SlotKind::Value, None);
        self
    }

    pub fn body(mut self, id: &str) -> Self {
        self.push(id, SlotKind::Statement, None);
        self
    }

    pub fn text(mut self, id: &str, default: &str) -> Self {
        self.push(id, SlotKind::Literal(FieldKind::Text), Some(default));
        self
    }

    pub fn number(mut self, id: &str, default: &str) -> Self {
        self.push(id, SlotKind::Literal(FieldKind::Number), Some(default));
        self
    }

    pub fn choice(mut self, id: &str, options: &[&str]) -> Self {
        let default = options.first().copied().unwrap_or_default();
        let options = options.iter().map(|o| o.to_string()).collect();
        self.push(id, SlotKind::Literal(FieldKind::Choice(options)), Some(default));
        self
    }

    pub fn terminal(mut self) -> Self {
        self.has_next = false;
        self
    }

    pub fn in_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = tooltip.into();
        self
    }

    pub fn with_hue(mut self, hue: u16) -> Self {
        self.hue = Some(hue);
        self
    }

    pub fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn default_text(&self, id: &str) -> Option<&str> {
        self.slot(id).and_then(|s| s.default.as_deref())
    }

    fn push(&mut self, id: &str, kind: SlotKind, default: Option<&str>) {
        self.slots.push(Slot {
            id: id.to_string(),
            kind,
            default: default.map(ToString::to_string),
        });
    }
}
