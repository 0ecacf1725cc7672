use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DeviceFormat {
    Xml => "xml",
    Log => "log",
    Bnk => "bnk",
    Pdf => "pdf",
    Unsupported => "unsupported",
});

str_enum!(ReportStatus {
    Pending => "pending",
    Reviewed => "reviewed",
    Signed => "signed",
});

str_enum!(Chamber {
    Ra => "ra",
    Rv => "rv",
    Lv => "lv",
});

impl DeviceFormat {
    /// Vendor family that produces this export, for logs and report labels.
    pub fn vendor(&self) -> &'static str {
        match self {
            Self::Xml => "Biotronik",
            Self::Log => "Abbott",
            Self::Bnk => "Boston Scientific",
            Self::Pdf => "PDF",
            Self::Unsupported => "unknown",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl Chamber {
    /// Chambers in lead-slot order.
    pub const ALL: [Chamber; 3] = [Chamber::Ra, Chamber::Rv, Chamber::Lv];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ra => "RA",
            Self::Rv => "RV",
            Self::Lv => "LV",
        }
    }
}
