use std::fmt;

/// One step of a compiled path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Object property: `.name` or `['name']`
    Child(String),
    /// Array position, negative counts from the end: `[n]`
    Index(i64),
    /// Every direct child: `.*` or `[*]`
    Wildcard,
    /// Python-style slice: `[start:stop:step]`
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// Several names or indices: `['a','b']`, `[0,2]`
    Union(Vec<Selector>),
    /// Apply the inner selector at this node and every node below it: `..name`
    Descendant(Box<Selector>),
}

/// A compiled path expression. The leading `$` is implicit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonPath {
    selectors: Vec<Selector>,
}

impl JsonPath {
    pub fn root() -> Self {
        JsonPath::default()
    }

    pub fn from_selectors(selectors: Vec<Selector>) -> Self {
        JsonPath { selectors }
    }

    /// `$.name`, built without going through a parser
    pub fn child(name: impl Into<String>) -> Self {
        JsonPath::from_selectors(vec![Selector::Child(name.into())])
    }

    /// `$[index]`, built without going through a parser
    pub fn index(index: i64) -> Self {
        JsonPath::from_selectors(vec![Selector::Index(index)])
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn is_root(&self) -> bool {
        self.selectors.is_empty()
    }
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '@');
    if plain {
        write!(f, ".{}", name)
    } else {
        write!(f, "['{}']", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

fn write_bracket_item(f: &mut fmt::Formatter<'_>, selector: &Selector) -> fmt::Result {
    match selector {
        Selector::Child(name) => {
            write!(f, "'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
        }
        Selector::Index(i) => write!(f, "{}", i),
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Child(name) => write_name(f, name),
            Selector::Index(i) => write!(f, "[{}]", i),
            Selector::Wildcard => f.write_str("[*]"),
            Selector::Slice { start, stop, step } => {
                f.write_str("[")?;
                if let Some(start) = start {
                    write!(f, "{}", start)?;
                }
                f.write_str(":")?;
                if let Some(stop) = stop {
                    write!(f, "{}", stop)?;
                }
                if let Some(step) = step {
                    write!(f, ":{}", step)?;
                }
                f.write_str("]")
            }
            Selector::Union(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write_bracket_item(f, item)?;
                }
                f.write_str("]")
            }
            Selector::Descendant(inner) => {
                f.write_str("..")?;
                match inner.as_ref() {
                    Selector::Child(name) => {
                        let rendered = format!("{}", Selector::Child(name.clone()));
                        f.write_str(rendered.trim_start_matches('.'))
                    }
                    Selector::Wildcard => f.write_str("*"),
                    other => write!(f, "{}", other),
                }
            }
        }
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for selector in &self.selectors {
            write!(f, "{}", selector)?;
        }
        Ok(())
    }
}
