//! Reflow settings resolved from the `[indentation]` and `[layout]` config
//! sections

use super::depth_map::{DepthInfo, StackPositionType};
use super::reindent::{construct_single_indent, IndentPolicy};
use crate::sql::errors::ReflowError;
use crate::sql::segments::{SyntaxKind, SyntaxSet};
use sqlreflow_config::{LayoutTypeSection, SqlreflowConfig};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    /// Exactly one space.
    Single,
    /// No whitespace.
    Touch,
    /// Whatever is there is fine.
    Any,
}

/// A spacing preference as written in config, e.g. `touch:inline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpacingRule {
    pub spacing: Spacing,
    /// Line breaks at the point are removed as well.
    pub inline: bool,
}

impl SpacingRule {
    pub const SINGLE: SpacingRule = SpacingRule::new(Spacing::Single, false);

    pub const fn new(spacing: Spacing, inline: bool) -> Self {
        Self { spacing, inline }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (spacing, inline) = match value.split_once(':') {
            Some((spacing, "inline")) => (spacing, true),
            Some(_) => return None,
            None => (value, false),
        };
        let spacing = match spacing {
            "single" => Spacing::Single,
            "touch" => Spacing::Touch,
            "any" => Spacing::Any,
            _ => return None,
        };
        Some(Self::new(spacing, inline))
    }
}

/// Which side of a line break a segment prefers to sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePosition {
    /// First on its line, after the break.
    Leading,
    /// Last on its line, before the break.
    Trailing,
}

impl LinePosition {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "leading" => Some(LinePosition::Leading),
            "trailing" => Some(LinePosition::Trailing),
            _ => None,
        }
    }
}

/// The layout configured for one segment type. Unset fields defer to
/// whatever else applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutRule {
    pub spacing_before: Option<SpacingRule>,
    pub spacing_after: Option<SpacingRule>,
    pub spacing_within: Option<SpacingRule>,
    pub line_position: Option<LinePosition>,
}

impl LayoutRule {
    fn from_section(name: &str, section: &LayoutTypeSection) -> Result<Self, ReflowError> {
        let spacing = |key: &'static str, value: &Option<String>| {
            value
                .as_deref()
                .map(|value| {
                    SpacingRule::parse(value).ok_or_else(|| ReflowError::InvalidLayout {
                        kind: name.to_string(),
                        key,
                        value: value.to_string(),
                    })
                })
                .transpose()
        };
        let line_position = section
            .line_position
            .as_deref()
            .map(|value| {
                LinePosition::parse(value).ok_or_else(|| ReflowError::InvalidLayout {
                    kind: name.to_string(),
                    key: "line_position",
                    value: value.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            spacing_before: spacing("spacing_before", &section.spacing_before)?,
            spacing_after: spacing("spacing_after", &section.spacing_after)?,
            spacing_within: spacing("spacing_within", &section.spacing_within)?,
            line_position,
        })
    }
}

/// Resolved layout for one block once its own type and the parents it opens
/// or closes have been taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockConfig {
    pub spacing_before: SpacingRule,
    pub spacing_after: SpacingRule,
    pub spacing_within: Option<SpacingRule>,
    pub line_position: Option<LinePosition>,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            spacing_before: SpacingRule::SINGLE,
            spacing_after: SpacingRule::SINGLE,
            spacing_within: None,
            line_position: None,
        }
    }
}

impl BlockConfig {
    fn incorporate(&mut self, rule: &LayoutRule) {
        self.spacing_before = rule.spacing_before.unwrap_or(self.spacing_before);
        self.spacing_after = rule.spacing_after.unwrap_or(self.spacing_after);
        self.spacing_within = rule.spacing_within.or(self.spacing_within);
        self.line_position = rule.line_position.or(self.line_position);
    }
}

fn default_layout() -> BTreeMap<SyntaxKind, LayoutRule> {
    use LinePosition::{Leading, Trailing};
    use Spacing::{Any, Single, Touch};

    let touch = Some(SpacingRule::new(Touch, false));
    let touch_inline = Some(SpacingRule::new(Touch, true));
    let any = Some(SpacingRule::new(Any, false));
    let rule = |spacing_before, spacing_after, spacing_within, line_position| LayoutRule {
        spacing_before,
        spacing_after,
        spacing_within,
        line_position,
    };

    BTreeMap::from([
        (SyntaxKind::Comma, rule(touch, None, None, Some(Trailing))),
        (SyntaxKind::BinaryOperator, rule(None, None, touch, Some(Leading))),
        (SyntaxKind::ComparisonOperator, rule(None, None, touch, Some(Leading))),
        (SyntaxKind::StatementTerminator, rule(touch, None, None, Some(Trailing))),
        (SyntaxKind::EndOfFile, rule(touch, None, None, None)),
        (SyntaxKind::StartBracket, rule(None, touch, None, None)),
        (SyntaxKind::EndBracket, rule(touch, None, None, None)),
        (SyntaxKind::StartSquareBracket, rule(None, touch, None, None)),
        (SyntaxKind::EndSquareBracket, rule(touch, None, None, None)),
        (SyntaxKind::ColumnReference, rule(None, None, touch_inline, None)),
        (SyntaxKind::TableReference, rule(None, None, touch_inline, None)),
        (SyntaxKind::WildcardIdentifier, rule(None, None, touch_inline, None)),
        (SyntaxKind::NumericLiteral, rule(None, None, touch_inline, None)),
        (SyntaxKind::FunctionName, rule(None, touch_inline, touch_inline, None)),
        (
            SyntaxKind::CommonTableExpression,
            rule(None, None, Some(SpacingRule::new(Single, true)), None),
        ),
        (SyntaxKind::Comment, rule(any, any, None, None)),
        (SyntaxKind::Placeholder, rule(any, any, None, None)),
        (SyntaxKind::TemplateLoop, rule(any, any, None, None)),
    ])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflowConfig {
    pub indent_unit: String,
    pub tab_space_size: usize,
    pub hanging_indents: bool,
    /// Lines inside any segment of these types are left alone.
    pub skip_indentation_in: SyntaxSet,
    pub allow_implicit_indents: bool,
    /// Spacing and line position per segment type.
    pub layout: BTreeMap<SyntaxKind, LayoutRule>,
}

impl Default for ReflowConfig {
    fn default() -> Self {
        Self {
            indent_unit: "space".to_string(),
            tab_space_size: 4,
            hanging_indents: false,
            skip_indentation_in: SyntaxSet::EMPTY,
            allow_implicit_indents: false,
            layout: default_layout(),
        }
    }
}

impl ReflowConfig {
    /// Validate and convert the loaded configuration.
    ///
    /// Fails on an indent unit other than `space`/`tab`, on type names in
    /// `skip_indentation_in` or `[layout.type]` that no segment carries, and
    /// on layout values that don't parse.
    pub fn from_config(config: &SqlreflowConfig) -> Result<Self, ReflowError> {
        let section = &config.indentation;
        construct_single_indent(&section.indent_unit, section.tab_space_size)?;

        let mut skip_indentation_in = SyntaxSet::EMPTY;
        for name in &section.skip_indentation_in {
            let kind: SyntaxKind = name
                .parse()
                .map_err(|_| ReflowError::UnknownSegmentType(name.clone()))?;
            skip_indentation_in.insert(kind);
        }

        let mut layout = BTreeMap::new();
        for (name, section) in &config.layout.types {
            let kind: SyntaxKind = name
                .parse()
                .map_err(|_| ReflowError::UnknownSegmentType(name.clone()))?;
            layout.insert(kind, LayoutRule::from_section(name, section)?);
        }

        Ok(Self {
            indent_unit: section.indent_unit.clone(),
            tab_space_size: section.tab_space_size,
            hanging_indents: section.hanging_indents,
            skip_indentation_in,
            allow_implicit_indents: section.allow_implicit_indents,
            layout,
        })
    }

    /// One level of indentation as literal text.
    pub fn single_indent(&self) -> Result<String, ReflowError> {
        construct_single_indent(&self.indent_unit, self.tab_space_size)
    }

    fn rules_for(&self, class_types: SyntaxSet) -> impl Iterator<Item = &LayoutRule> + '_ {
        self.layout
            .iter()
            .filter(move |(kind, _)| class_types.contains(**kind))
            .map(|(_, rule)| rule)
    }

    /// Layout for a block with `class_types`.
    ///
    /// With `depth_info`, parents that the block opens lend it their
    /// `spacing_before` and parents it closes lend their `spacing_after`,
    /// walking outwards until the block is neither first nor last. The
    /// block's own types are applied last and win.
    pub fn get_block_config(
        &self,
        class_types: SyntaxSet,
        depth_info: Option<&DepthInfo>,
    ) -> BlockConfig {
        use StackPositionType::{End, Solo, Start};

        let mut block = BlockConfig::default();
        if let Some(depth_info) = depth_info {
            let (mut parent_start, mut parent_end) = (true, true);
            let stack = depth_info
                .stack_positions
                .iter()
                .zip(&depth_info.stack_class_types)
                .rev();
            for (position, parent_types) in stack {
                parent_start &= matches!(position.position_type, Solo | Start);
                parent_end &= matches!(position.position_type, Solo | End);
                if !(parent_start || parent_end) {
                    break;
                }
                for rule in self.rules_for(*parent_types) {
                    if parent_start {
                        block.spacing_before = rule.spacing_before.unwrap_or(block.spacing_before);
                    }
                    if parent_end {
                        block.spacing_after = rule.spacing_after.unwrap_or(block.spacing_after);
                    }
                }
            }
        }
        for rule in self.rules_for(class_types) {
            block.incorporate(rule);
        }
        block
    }

    pub fn indent_policy(&self) -> IndentPolicy {
        IndentPolicy {
            allow_implicit_indents: self.allow_implicit_indents,
            hanging_indents: self.hanging_indents,
            tab_space_size: self.tab_space_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::reflow::DepthMap;
    use crate::sql::segments::Segment;
    use sqlreflow_config::Loader;

    #[test]
    fn test_defaults_match_embedded_config() {
        let loaded = Loader::new().build().unwrap();
        let config = ReflowConfig::from_config(&loaded).unwrap();
        assert_eq!(config, ReflowConfig::default());
        assert_eq!(config.single_indent().unwrap(), "    ");
    }

    #[test]
    fn test_tab_unit_and_skip_types() {
        let loaded = Loader::new()
            .with_toml_str(
                r#"
[indentation]
indent_unit = "tab"
skip_indentation_in = ["with_compound_statement"]
"#,
            )
            .build()
            .unwrap();
        let config = ReflowConfig::from_config(&loaded).unwrap();
        assert_eq!(config.single_indent().unwrap(), "\t");
        assert!(config
            .skip_indentation_in
            .contains(SyntaxKind::WithCompoundStatement));
    }

    #[test]
    fn test_spacing_rule_parsing() {
        assert_eq!(SpacingRule::parse("single"), Some(SpacingRule::SINGLE));
        assert_eq!(
            SpacingRule::parse("touch:inline"),
            Some(SpacingRule::new(Spacing::Touch, true))
        );
        assert_eq!(SpacingRule::parse("touch:sometimes"), None);
        assert_eq!(SpacingRule::parse("align"), None);
        assert_eq!(LinePosition::parse("leading"), Some(LinePosition::Leading));
        assert_eq!(LinePosition::parse("alone"), None);
    }

    #[test]
    fn test_block_config_claims_parent_edges() {
        let config = ReflowConfig::default();
        let name = Segment::token(SyntaxKind::NakedIdentifier, "count", None);
        let function = Segment::node(
            SyntaxKind::Function,
            vec![
                Segment::node(SyntaxKind::FunctionName, vec![name.clone()]),
                Segment::token(SyntaxKind::StartBracket, "(", None),
                Segment::token(SyntaxKind::EndBracket, ")", None),
            ],
        );
        let map = DepthMap::from_parent(&function);
        let depth_info = map.get_depth_info(&name).unwrap();

        let block = config.get_block_config(name.class_types(), Some(depth_info));
        assert_eq!(block.spacing_after, SpacingRule::new(Spacing::Touch, true));
        assert_eq!(block.spacing_before, SpacingRule::SINGLE);

        let bare = config.get_block_config(name.class_types(), None);
        assert_eq!(bare, BlockConfig::default());

        let comma = config.get_block_config(SyntaxSet::single(SyntaxKind::Comma), None);
        assert_eq!(comma.spacing_before.spacing, Spacing::Touch);
        assert_eq!(comma.line_position, Some(LinePosition::Trailing));
    }

    #[test]
    fn test_layout_overrides_and_errors() {
        let loaded = Loader::new()
            .with_toml_str(
                r#"
[layout.type.comma]
spacing_before = "single"
line_position = "leading"
"#,
            )
            .build()
            .unwrap();
        let config = ReflowConfig::from_config(&loaded).unwrap();
        let comma = config.layout[&SyntaxKind::Comma];
        assert_eq!(comma.spacing_before, Some(SpacingRule::SINGLE));
        assert_eq!(comma.line_position, Some(LinePosition::Leading));

        let loaded = Loader::new()
            .with_toml_str("[layout.type.comma]\nspacing_after = \"wide\"\n")
            .build()
            .unwrap();
        assert_eq!(
            ReflowConfig::from_config(&loaded),
            Err(ReflowError::InvalidLayout {
                kind: "comma".to_string(),
                key: "spacing_after",
                value: "wide".to_string(),
            })
        );

        let loaded = Loader::new()
            .with_toml_str("[layout.type.select_clause]\nline_position = \"alone\"\n")
            .build()
            .unwrap();
        assert!(matches!(
            ReflowConfig::from_config(&loaded),
            Err(ReflowError::InvalidLayout { key: "line_position", .. })
        ));

        let loaded = Loader::new()
            .with_toml_str("[layout.type.sign_indicator]\nspacing_after = \"touch\"\n")
            .build()
            .unwrap();
        assert_eq!(
            ReflowConfig::from_config(&loaded),
            Err(ReflowError::UnknownSegmentType("sign_indicator".to_string()))
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let loaded = Loader::new()
            .with_toml_str("[indentation]\nindent_unit = \"emoji\"\n")
            .build()
            .unwrap();
        assert_eq!(
            ReflowConfig::from_config(&loaded),
            Err(ReflowError::InvalidIndentUnit("emoji".to_string()))
        );

        let loaded = Loader::new()
            .with_toml_str("[indentation]\nskip_indentation_in = [\"script_content\"]\n")
            .build()
            .unwrap();
        assert_eq!(
            ReflowConfig::from_config(&loaded),
            Err(ReflowError::UnknownSegmentType("script_content".to_string()))
        );
    }
}
