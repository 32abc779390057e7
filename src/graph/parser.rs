use crate::cell::CellConfig;
use std::fmt;

/// Separator between cells in a pipeline expression.
pub const CELL_SEPARATOR: char = '!';

/// One cell of a pipeline expression: its registry name and properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDescriptor {
    pub name: String,
    pub properties: CellConfig,
}

/// A pipeline expression that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Cell being parsed when the error occurred, if its name was read
    pub cell: Option<String>,
    pub reason: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell {
            Some(cell) => write!(f, "[{}] {}", cell, self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses `name key=value ... ! name key=value ...` into descriptors.
pub fn parse_pipeline(expr: &str) -> Result<Vec<CellDescriptor>, ParseError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ParseError {
            cell: None,
            reason: String::from("empty pipeline"),
        });
    }

    let mut descriptors = Vec::new();
    for segment in expr.split(CELL_SEPARATOR) {
        let mut tokens = segment.split_whitespace();
        let name = tokens.next().ok_or_else(|| ParseError {
            cell: None,
            reason: format!("no cell description before {}", CELL_SEPARATOR),
        })?;

        let mut properties = CellConfig::new();
        for token in tokens {
            let mut parts = token.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) if !key.is_empty() => {
                    properties.insert(key.to_string(), value.to_string());
                }
                _ => {
                    return Err(ParseError {
                        cell: Some(name.to_string()),
                        reason: format!("property format must be key=value, got {}", token),
                    })
                }
            }
        }
        descriptors.push(CellDescriptor {
            name: name.to_string(),
            properties,
        });
    }
    Ok(descriptors)
}
