use std::{collections::HashSet, fmt, str::FromStr};

/// Kind of resource bound to a descriptor.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum DescriptorKind {
    Buffer,
    Image,
}

/// A single binding of a descriptor set: `binding:[count]kind`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Descriptor {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
}

/// Ordered list of descriptors a program expects in descriptor set 0.
///
/// Parsed from `<binding>:[<count>]<kind>` tokens separated by commas, e.g. `0:buffer,1:[4]image`.
/// The count is optional and defaults to 1. Bindings must be unique.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSetLayout {
    descriptors: Vec<Descriptor>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty descriptor set layout")]
    Empty,

    #[error("invalid descriptor `{token}`, expected <binding>:[<count>]<type>")]
    InvalidToken { token: String },

    #[error("unknown descriptor type: {kind}")]
    UnknownKind { kind: String },

    #[error("binding {binding} has a zero descriptor count")]
    ZeroCount { binding: u32 },

    #[error("binding {binding} is declared more than once")]
    DuplicateBinding { binding: u32 },
}

impl DescriptorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorKind::Buffer => "buffer",
            DescriptorKind::Image => "image",
        }
    }
}

impl FromStr for DescriptorKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buffer" => Ok(DescriptorKind::Buffer),
            "image" => Ok(DescriptorKind::Image),
            _ => Err(ParseError::UnknownKind { kind: s.to_string() }),
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Descriptor {
    pub fn new(binding: u32, kind: DescriptorKind, count: u32) -> Self {
        Self { binding, kind, count }
    }

    /// Whether host accessors for this binding take an index.
    pub fn is_array(&self) -> bool {
        self.count > 1
    }
}

impl FromStr for Descriptor {
    type Err = ParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let invalid = || ParseError::InvalidToken {
            token: token.to_string(),
        };

        let (binding, rest) = token.split_once(':').ok_or_else(invalid)?;
        let binding = binding.trim().parse::<u32>().map_err(|_| invalid())?;

        let (count, kind) = match rest.strip_prefix('[') {
            Some(rest) => {
                let (count, kind) = rest.split_once(']').ok_or_else(invalid)?;
                (count.trim().parse::<u32>().map_err(|_| invalid())?, kind)
            }
            None => (1, rest),
        };

        let kind = kind.trim();
        if kind.is_empty() {
            return Err(invalid());
        }

        if count == 0 {
            return Err(ParseError::ZeroCount { binding });
        }

        Ok(Self {
            binding,
            kind: kind.parse()?,
            count,
        })
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count > 1 {
            write!(f, "{}:[{}]{}", self.binding, self.count, self.kind)
        } else {
            write!(f, "{}:{}", self.binding, self.kind)
        }
    }
}

impl DescriptorSetLayout {
    pub fn parse(layout: &str) -> Result<Self, ParseError> {
        if layout.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();
        for token in layout.split(',') {
            let desc = token.parse::<Descriptor>()?;
            if !seen.insert(desc.binding) {
                return Err(ParseError::DuplicateBinding { binding: desc.binding });
            }

            descriptors.push(desc);
        }

        Ok(Self { descriptors })
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, binding: u32) -> Option<&Descriptor> {
        self.descriptors.iter().find(|desc| desc.binding == binding)
    }
}

impl FromStr for DescriptorSetLayout {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DescriptorSetLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, desc) in self.descriptors.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", desc)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DescriptorSetLayout {
    type Item = &'a Descriptor;
    type IntoIter = std::slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
