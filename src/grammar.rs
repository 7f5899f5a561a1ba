//! Grammar compiler (C4).
//!
//! Compiles the configured command/argument tables into per-template regex
//! matchers once, at session construction (see `SPEC_FULL.md` §4.4 and §9),
//! and validates inbound command text against them.

use crate::config::{ArgumentDescriptor, ArgumentValues, CommandSpec};
use crate::error::GatewayError;
use regex::Regex;
use std::collections::HashMap;

/// One `^`-delimited part of a compiled template.
///
/// Most parts reduce to a single anchored regex. `float(N,D)` needs an
/// extra total-length bound (`SPEC_FULL.md` §3: "total length ≤ N") that the
/// `regex` crate cannot express in one pattern without lookaround, which it
/// does not support; that case carries the bound alongside the regex that
/// checks the digit/dot shape.
#[derive(Debug)]
enum CompiledPart {
    Pattern(Regex),
    BoundedFloat { max_len: usize, allow_off: bool, shape: Regex },
}

impl CompiledPart {
    fn is_match(&self, part: &str) -> bool {
        match self {
            CompiledPart::Pattern(re) => re.is_match(part),
            CompiledPart::BoundedFloat { max_len, allow_off, shape } => {
                (*allow_off && part == "OFF") || (part.len() <= *max_len && shape.is_match(part))
            }
        }
    }
}

/// A fully compiled command template.
#[derive(Debug)]
struct CompiledTemplate {
    /// The original template string, e.g. `DRUG_LIB^<QUANTITY>`.
    source: String,
    parts: Vec<CompiledPart>,
}

/// The compiled grammar for one pump: every configured template, matchable
/// against inbound command text without recompiling.
#[derive(Debug)]
pub struct Grammar {
    templates: Vec<CompiledTemplate>,
}

fn escape_literal(s: &str) -> String {
    regex::escape(s)
}

/// Translate one argument's `values` spec into a [`CompiledPart`].
fn compile_values(arg_name: &str, values: &ArgumentValues) -> Result<CompiledPart, GatewayError> {
    match values {
        ArgumentValues::Literals(list) => {
            let pattern = list.iter().map(|s| escape_literal(s)).collect::<Vec<_>>().join("|");
            Ok(CompiledPart::Pattern(Regex::new(&format!("^{pattern}$")).unwrap()))
        }
        ArgumentValues::Spec(spec) => compile_spec(arg_name, spec),
    }
}

fn compile_spec(arg_name: &str, spec: &str) -> Result<CompiledPart, GatewayError> {
    // Compiled afresh per call: this runs once per placeholder at session
    // construction (§4.4), never on the per-message hot path.
    let float_re = Regex::new(r"^float\((?P<length>\d+)(,(?P<decimal>\d))?\)(,(?P<off>OFF))?$").unwrap();
    let int_re = Regex::new(r"^int\((?P<length>\d+)\)(,(?P<off>OFF))?$").unwrap();
    let str_re = Regex::new(r"^str\((?P<length>\d+)\)(,(?P<off>OFF))?$").unwrap();
    let own_re = Regex::new(r"^re\((?P<pattern>.+)\)$").unwrap();

    if let Some(caps) = float_re.captures(spec) {
        let max_len: usize = caps["length"].parse().unwrap_or(0);
        let min_frac = caps.name("decimal").map(|m| m.as_str()).unwrap_or("1");
        let allow_off = caps.name("off").is_some();
        let shape = Regex::new(&format!(r"^\d+\.\d{{{min_frac},}}$")).unwrap();
        return Ok(CompiledPart::BoundedFloat { max_len, allow_off, shape });
    }
    if let Some(caps) = int_re.captures(spec) {
        let length: usize = caps["length"].parse().unwrap_or(0);
        if length == 0 {
            return Err(GatewayError::Argument(format!("int(N) requires N > 0. Argument: {arg_name}")));
        }
        let pattern = format!(r"^\d{{1,{length}}}$");
        let pattern = if caps.name("off").is_some() { format!(r"^(\d{{1,{length}}}|OFF)$") } else { pattern };
        let regex = Regex::new(&pattern).map_err(|e| GatewayError::Argument(format!("Invalid int spec for {arg_name}: {e}")))?;
        return Ok(CompiledPart::Pattern(regex));
    }
    if let Some(caps) = str_re.captures(spec) {
        let length: usize = caps["length"].parse().unwrap_or(0);
        if length == 0 {
            return Err(GatewayError::Argument(format!("str(N) requires N > 0. Argument: {arg_name}")));
        }
        let pattern = format!(r"^[^\^]{{1,{length}}}$");
        let pattern = if caps.name("off").is_some() { format!(r"^([^\^]{{1,{length}}}|OFF)$") } else { pattern };
        let regex = Regex::new(&pattern).map_err(|e| GatewayError::Argument(format!("Invalid str spec for {arg_name}: {e}")))?;
        return Ok(CompiledPart::Pattern(regex));
    }
    if spec == "DateAndTimeStamp" {
        return Ok(CompiledPart::Pattern(Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$").unwrap()));
    }
    if spec == "DateStamp" {
        return Ok(CompiledPart::Pattern(Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap()));
    }
    if spec == "DurationStamp" {
        return Ok(CompiledPart::Pattern(Regex::new(r"^(\d{2}:\d{2}:\d{2}|24h\+)$").unwrap()));
    }
    if let Some(caps) = own_re.captures(spec) {
        let pattern = format!("^{}$", &caps["pattern"]);
        let regex = Regex::new(&pattern).map_err(|e| GatewayError::Argument(format!("Invalid regex for {arg_name}: {e}")))?;
        return Ok(CompiledPart::Pattern(regex));
    }

    Err(GatewayError::Argument(format!(
        "Bad values provided for argument. Must be int(length), float(length,decimal_places), \
         str(max_chars_length), DateAndTimeStamp, DurationStamp, DateStamp, own regex pattern \
         i.e. re(my_pattern) or a literal list. Argument: {arg_name}"
    )))
}

fn compile_template(
    template: &str,
    arguments: &HashMap<String, ArgumentDescriptor>,
) -> Result<CompiledTemplate, GatewayError> {
    let mut parts = template.split('^');
    let head = parts.next().unwrap_or_default();

    let mut compiled = vec![CompiledPart::Pattern(Regex::new(&format!("^{}$", escape_literal(head))).unwrap())];

    for raw_part in parts {
        if !raw_part.starts_with('<') || !raw_part.ends_with('>') {
            return Err(GatewayError::Config(format!(
                "Argument badly described in command template in config.json. Should be \
                 '<ARGUMENT_NAME>' Command: {template}"
            )));
        }
        let descriptor = arguments.get(raw_part).ok_or_else(|| {
            GatewayError::Config(format!(
                "Provided argument from command is not described in arguments part in config.json. Command: {template}"
            ))
        })?;
        compiled.push(compile_values(raw_part, &descriptor.values)?);
    }

    Ok(CompiledTemplate { source: template.to_string(), parts: compiled })
}

impl Grammar {
    /// Compile every configured command template against the argument table.
    pub fn compile(
        command_set: &HashMap<String, CommandSpec>,
        arguments: &HashMap<String, ArgumentDescriptor>,
    ) -> Result<Self, GatewayError> {
        let mut templates = Vec::with_capacity(command_set.len());
        for template in command_set.keys() {
            templates.push(compile_template(template, arguments)?);
        }
        Ok(Self { templates })
    }

    /// Validate `command_text` against the compiled templates.
    ///
    /// Among templates with matching arity, the first declared template
    /// whose parts all match wins; this is a deliberate simplification.
    pub fn validate(&self, command_text: &str) -> Result<(), GatewayError> {
        let parts: Vec<&str> = command_text.split('^').collect();

        for template in &self.templates {
            if template.parts.len() != parts.len() {
                continue;
            }
            if template.parts.iter().zip(parts.iter()).all(|(p, part)| p.is_match(part)) {
                return Ok(());
            }
        }

        Err(GatewayError::Command(format!(
            "Provided command pattern does not exist in config.json. Command: {command_text}"
        )))
    }

    /// The source template strings, in declared order (used by the loopback).
    pub fn template_sources(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.source.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArgumentDescriptor, ArgumentValues, CommandSpec};

    fn arguments() -> HashMap<String, ArgumentDescriptor> {
        let mut map = HashMap::new();
        map.insert(
            "<QUANTITY>".to_string(),
            ArgumentDescriptor { values: ArgumentValues::Spec("int(2)".to_string()) },
        );
        map.insert(
            "<UNIT>".to_string(),
            ArgumentDescriptor {
                values: ArgumentValues::Literals(vec!["ml".to_string(), "ml/h".to_string()]),
            },
        );
        map
    }

    fn command_set() -> HashMap<String, CommandSpec> {
        let mut map = HashMap::new();
        map.insert("ALARM".to_string(), CommandSpec { response: "ALARM".to_string() });
        map.insert(
            "DRUG_LIB^<QUANTITY>^<UNIT>".to_string(),
            CommandSpec { response: "DRUG_LIB^<QUANTITY>^<UNIT>".to_string() },
        );
        map
    }

    #[test]
    fn accepts_values_within_spec() {
        let grammar = Grammar::compile(&command_set(), &arguments()).unwrap();
        assert!(grammar.validate("DRUG_LIB^42^ml").is_ok());
        assert!(grammar.validate("ALARM").is_ok());
    }

    #[test]
    fn rejects_values_outside_spec() {
        let grammar = Grammar::compile(&command_set(), &arguments()).unwrap();
        // int(2) allows at most 2 digits.
        assert!(grammar.validate("DRUG_LIB^100^ml").is_err());
        assert!(grammar.validate("DRUG_LIB^42^gallons").is_err());
    }

    #[test]
    fn rejects_unknown_command() {
        let grammar = Grammar::compile(&command_set(), &arguments()).unwrap();
        let err = grammar.validate("NON_EXISTENT").unwrap_err();
        assert!(matches!(err, GatewayError::Command(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn rejects_unknown_placeholder_at_compile_time() {
        let mut commands = HashMap::new();
        commands.insert("X^<MISSING>".to_string(), CommandSpec { response: "X^<MISSING>".to_string() });
        let err = Grammar::compile(&commands, &HashMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn rejects_malformed_values_spec_at_compile_time() {
        let mut arguments = HashMap::new();
        arguments.insert(
            "<BAD>".to_string(),
            ArgumentDescriptor { values: ArgumentValues::Spec("not_a_real_spec".to_string()) },
        );
        let mut commands = HashMap::new();
        commands.insert("X^<BAD>".to_string(), CommandSpec { response: "X^<BAD>".to_string() });
        let err = Grammar::compile(&commands, &arguments).unwrap_err();
        assert!(matches!(err, GatewayError::Argument(_)));
    }

    #[test]
    fn rejects_zero_length_int_and_str_specs_at_compile_time() {
        for spec in ["int(0)", "str(0)"] {
            let mut arguments = HashMap::new();
            arguments.insert("<BAD>".to_string(), ArgumentDescriptor { values: ArgumentValues::Spec(spec.to_string()) });
            let mut commands = HashMap::new();
            commands.insert("X^<BAD>".to_string(), CommandSpec { response: "X^<BAD>".to_string() });
            let err = Grammar::compile(&commands, &arguments).unwrap_err();
            assert!(matches!(err, GatewayError::Argument(_)), "spec {spec} should be rejected as GatewayError::Argument");
        }
    }

    #[test]
    fn off_modifier_accepts_literal_off() {
        let mut arguments = HashMap::new();
        arguments.insert(
            "<RATE>".to_string(),
            ArgumentDescriptor { values: ArgumentValues::Spec("float(4),OFF".to_string()) },
        );
        let mut commands = HashMap::new();
        commands.insert("RATE^<RATE>".to_string(), CommandSpec { response: "RATE^<RATE>".to_string() });
        let grammar = Grammar::compile(&commands, &arguments).unwrap();
        assert!(grammar.validate("RATE^OFF").is_ok());
        assert!(grammar.validate("RATE^1.5").is_ok());
    }
}
