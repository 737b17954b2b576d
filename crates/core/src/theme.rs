//! Operating profiles ("themes") for the submission gateway.
//!
//! A [`Theme`] is resolved once per request from an untrusted selector and
//! then consulted everywhere theme-specific behaviour is needed: which form
//! fields are required, which writer command runs, and which flag each
//! record field is passed under.

use serde::Serialize;

use crate::record::Field;

/// Selector key of the default theme.
pub const THEME_TIS: &str = "tis";

/// Selector key of the IoT theme.
pub const THEME_IOT: &str = "iot";

/// A closed set of operating profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Titanium Server regression reports. The default profile.
    #[default]
    Tis,
    /// IoT board reports.
    Iot,
}

/// One argument slot of the record-writer command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterArg {
    /// Path of the record file the writer produces.
    OutputPath,
    /// Free-text tags, combined with the theme's tag suffix when it has one.
    TagExpression,
    /// Full path of the stored attachment, or empty.
    LogPath,
    /// A record field passed through verbatim.
    Field(Field),
}

impl WriterArg {
    /// The record field this slot carries, if any.
    pub fn source_field(self) -> Option<Field> {
        match self {
            Self::TagExpression => Some(Field::Tags),
            Self::Field(field) => Some(field),
            Self::OutputPath | Self::LogPath => None,
        }
    }
}

/// Static description of a theme.
#[derive(Debug)]
pub struct ThemeProfile {
    pub key: &'static str,
    /// Display title, consumed by the presentation layer.
    pub title: &'static str,
    /// Background asset name, consumed by the presentation layer.
    pub background: &'static str,
    /// File name of the writer command inside the writer directory.
    pub writer_command: &'static str,
    /// Default tags appended to the caller's tags.
    pub tag_suffix: Option<&'static str>,
    /// Domain used when the caller leaves it blank.
    pub default_domain: &'static str,
    pub required_fields: &'static [Field],
    pub optional_fields: &'static [Field],
    /// Writer flags, in command-line order.
    pub writer_flags: &'static [(&'static str, WriterArg)],
}

static TIS_PROFILE: ThemeProfile = ThemeProfile {
    key: THEME_TIS,
    title: "TiS",
    background: "paia_bambo_blinds_bg.jpg",
    writer_command: "ini_writer.sh",
    tag_suffix: Some("titanium_server_regression_r4,cgcs_manual"),
    default_domain: "TEST",
    required_fields: &[Field::Tester, Field::TestName, Field::Result],
    optional_fields: &[
        Field::Jira,
        Field::UserStory,
        Field::Domain,
        Field::Tags,
        Field::ReleaseName,
        Field::Lab,
        Field::Build,
    ],
    writer_flags: &[
        ("-o", WriterArg::OutputPath),
        ("-x", WriterArg::TagExpression),
        ("-n", WriterArg::Field(Field::Tester)),
        ("-t", WriterArg::Field(Field::TestName)),
        ("-r", WriterArg::Field(Field::Result)),
        ("-l", WriterArg::Field(Field::Lab)),
        ("-b", WriterArg::Field(Field::Build)),
        ("-a", WriterArg::LogPath),
        ("-j", WriterArg::Field(Field::Jira)),
        ("-u", WriterArg::Field(Field::UserStory)),
        ("-d", WriterArg::Field(Field::Domain)),
        ("-R", WriterArg::Field(Field::ReleaseName)),
    ],
};

static IOT_PROFILE: ThemeProfile = ThemeProfile {
    key: THEME_IOT,
    title: "IoT",
    background: "aero_bike_gear_cluster_shadowed_cls_bg.jpg",
    writer_command: "ini_writer_iot.sh",
    tag_suffix: None,
    default_domain: "Functional",
    required_fields: &[
        Field::Tester,
        Field::TestName,
        Field::Result,
        Field::BoardName,
    ],
    optional_fields: &[
        Field::Jira,
        Field::UserStory,
        Field::Domain,
        Field::Tags,
        Field::ReleaseName,
        Field::Environment,
        Field::Project,
        Field::Barcode,
        Field::Bsp,
        Field::ConfigLabel,
    ],
    writer_flags: &[
        ("-o", WriterArg::OutputPath),
        ("-n", WriterArg::Field(Field::Tester)),
        ("-t", WriterArg::Field(Field::TestName)),
        ("-r", WriterArg::Field(Field::Result)),
        ("-b", WriterArg::Field(Field::Barcode)),
        ("-a", WriterArg::LogPath),
        ("-j", WriterArg::Field(Field::Jira)),
        ("-u", WriterArg::Field(Field::UserStory)),
        ("-d", WriterArg::Field(Field::Domain)),
        ("-N", WriterArg::Field(Field::BoardName)),
        ("-B", WriterArg::Field(Field::Bsp)),
        ("-C", WriterArg::Field(Field::ConfigLabel)),
        ("-R", WriterArg::Field(Field::ReleaseName)),
        ("-E", WriterArg::Field(Field::Environment)),
        ("-T", WriterArg::TagExpression),
        ("-P", WriterArg::Field(Field::Project)),
    ],
};

impl Theme {
    /// Every supported theme.
    pub const ALL: [Theme; 2] = [Theme::Tis, Theme::Iot];

    /// Map a requested selector to a theme.
    ///
    /// Total: only an exact key selects a theme. Anything else, including
    /// case or whitespace variants, falls back to [`Theme::Tis`].
    pub fn resolve(requested: &str) -> Theme {
        if let Some(theme) = Self::ALL.into_iter().find(|theme| theme.key() == requested) {
            return theme;
        }
        if !requested.is_empty() {
            tracing::warn!(requested, "Unknown theme requested, using default");
        }
        Theme::default()
    }

    pub fn profile(self) -> &'static ThemeProfile {
        match self {
            Theme::Tis => &TIS_PROFILE,
            Theme::Iot => &IOT_PROFILE,
        }
    }

    pub fn key(self) -> &'static str {
        self.profile().key
    }

    pub fn writer_command(self) -> &'static str {
        self.profile().writer_command
    }

    pub fn is_required(self, field: Field) -> bool {
        self.profile().required_fields.contains(&field)
    }

    /// Whether the theme accepts `field` at all.
    pub fn accepts(self, field: Field) -> bool {
        let profile = self.profile();
        profile.required_fields.contains(&field) || profile.optional_fields.contains(&field)
    }

    /// Combine caller tags with the theme's tag suffix, skipping empty parts.
    pub fn tag_expression(self, tags: &str) -> String {
        let tags = tags.trim();
        match self.profile().tag_suffix {
            Some(suffix) if tags.is_empty() => suffix.to_string(),
            Some(suffix) => format!("{tags},{suffix}"),
            None => tags.to_string(),
        }
    }

    /// Serializable view of the theme for the presentation layer.
    pub fn descriptor(self) -> ThemeDescriptor {
        let profile = self.profile();
        ThemeDescriptor {
            theme: self,
            title: profile.title,
            background: profile.background,
            writer_command: profile.writer_command,
            default_domain: profile.default_domain,
            required_fields: profile
                .required_fields
                .iter()
                .map(|f| f.form_name())
                .collect(),
            optional_fields: profile
                .optional_fields
                .iter()
                .map(|f| f.form_name())
                .collect(),
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Theme description served to form renderers.
#[derive(Debug, Serialize)]
pub struct ThemeDescriptor {
    pub theme: Theme,
    pub title: &'static str,
    pub background: &'static str,
    pub writer_command: &'static str,
    pub default_domain: &'static str,
    pub required_fields: Vec<&'static str>,
    pub optional_fields: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
