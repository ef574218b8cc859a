//! Command model and wire translation.
//!
//! Every control decision leaves the system as a [`Command`]: a tagged value
//! in one of three families with different delivery semantics.
//!
//! - **Toggle**: boolean engage/disengage pulse, dispatched as the bare
//!   event name.
//! - **SetValue**: durable setpoint held by the autopilot receiver,
//!   dispatched as a `{command, value}` pair.
//! - **Axis**: continuous deflection that must be re-asserted every tick to
//!   hold position; bypasses the queue with its own rate floor.
//!
//! API-facing aliases (e.g. `AP_ALT_VAR_SET`, `AP_HDG_VAR_SET`) translate to
//! the wire names through a fixed table.

mod queue;

pub use queue::{
    ActiveOverride, CommandLogEntry, CommandQueue, CommandSink, NullSink, QueueCallbacks,
    QueueStats, SafetyClamps, TransportError, DEFAULT_OVERRIDE_DURATION, DEFAULT_RATE_LIMIT,
};

/// Delivery family of a command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// Boolean engage/disengage pulse.
    Toggle,
    /// Durable numeric setpoint.
    SetValue,
    /// Continuous deflection, re-asserted to hold.
    Axis,
}

/// Scheduling priority for queued commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Normal FIFO ordering.
    #[default]
    Normal,
    /// Safety-critical; jumps to the head of the queue.
    High,
}

/// Pilot-overridable control axis.
///
/// An active override on an axis suppresses every AI command mapped to it
/// until the override expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideAxis {
    Hdg,
    Alt,
    Vs,
    Spd,
    Nav,
    Apr,
    Master,
    Throttle,
    Mixture,
    Elevator,
    Rudder,
    Steering,
    Ailerons,
    Flaps,
    Brakes,
}

impl OverrideAxis {
    /// Parse the API-facing axis name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "HDG" => Self::Hdg,
            "ALT" => Self::Alt,
            "VS" => Self::Vs,
            "SPD" => Self::Spd,
            "NAV" => Self::Nav,
            "APR" => Self::Apr,
            "MASTER" => Self::Master,
            "THROTTLE" => Self::Throttle,
            "MIXTURE" => Self::Mixture,
            "ELEVATOR" => Self::Elevator,
            "RUDDER" => Self::Rudder,
            "STEERING" => Self::Steering,
            "AILERONS" => Self::Ailerons,
            "FLAPS" => Self::Flaps,
            "BRAKES" => Self::Brakes,
            _ => return None,
        })
    }
}

impl std::fmt::Display for OverrideAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Hdg => "HDG",
            Self::Alt => "ALT",
            Self::Vs => "VS",
            Self::Spd => "SPD",
            Self::Nav => "NAV",
            Self::Apr => "APR",
            Self::Master => "MASTER",
            Self::Throttle => "THROTTLE",
            Self::Mixture => "MIXTURE",
            Self::Elevator => "ELEVATOR",
            Self::Rudder => "RUDDER",
            Self::Steering => "STEERING",
            Self::Ailerons => "AILERONS",
            Self::Flaps => "FLAPS",
            Self::Brakes => "BRAKES",
        };
        write!(f, "{}", name)
    }
}

macro_rules! command_kinds {
    ($( $variant:ident => ($wire:literal, $family:ident, $axis:expr) ),+ $(,)?) => {
        /// Every command kind the bridge understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandKind {
            $( $variant, )+
        }

        impl CommandKind {
            /// The external event name sent over the wire.
            pub fn wire_name(&self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }

            /// Delivery family.
            pub fn family(&self) -> CommandFamily {
                match self {
                    $( Self::$variant => CommandFamily::$family, )+
                }
            }

            /// The pilot-override axis this kind maps to, if any.
            pub fn override_axis(&self) -> Option<OverrideAxis> {
                match self {
                    $( Self::$variant => $axis, )+
                }
            }

            /// Look up a kind by its wire name.
            pub fn from_wire_name(name: &str) -> Option<Self> {
                match name {
                    $( $wire => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

command_kinds! {
    // Autopilot toggles
    ApMaster => ("AP_MASTER", Toggle, Some(OverrideAxis::Master)),
    ApHdgHold => ("AP_HDG_HOLD", Toggle, Some(OverrideAxis::Hdg)),
    ApAltHold => ("AP_ALT_HOLD", Toggle, Some(OverrideAxis::Alt)),
    ApVsHold => ("AP_VS_HOLD", Toggle, Some(OverrideAxis::Vs)),
    ApNav1Hold => ("AP_NAV1_HOLD", Toggle, Some(OverrideAxis::Nav)),
    ApAprHold => ("AP_APR_HOLD", Toggle, Some(OverrideAxis::Apr)),
    ApBcHold => ("AP_BC_HOLD", Toggle, Some(OverrideAxis::Apr)),
    ApVnav => ("AP_VNAV", Toggle, Some(OverrideAxis::Nav)),
    ApSpdHold => ("AP_PANEL_SPEED_HOLD", Toggle, Some(OverrideAxis::Spd)),
    ToggleFlightDirector => ("TOGGLE_FLIGHT_DIRECTOR", Toggle, Some(OverrideAxis::Master)),
    YawDamperToggle => ("YAW_DAMPER_TOGGLE", Toggle, Some(OverrideAxis::Rudder)),

    // Aircraft systems toggles
    FlapsUp => ("FLAPS_UP", Toggle, Some(OverrideAxis::Flaps)),
    FlapsDown => ("FLAPS_DOWN", Toggle, Some(OverrideAxis::Flaps)),
    ParkingBrakes => ("PARKING_BRAKES", Toggle, Some(OverrideAxis::Brakes)),
    LandingLightsToggle => ("LANDING_LIGHTS_TOGGLE", Toggle, None),
    MixtureRich => ("MIXTURE_RICH", Toggle, Some(OverrideAxis::Mixture)),
    MixtureLean => ("MIXTURE_LEAN", Toggle, Some(OverrideAxis::Mixture)),
    QuickPreflight => ("QUICK_PREFLIGHT", Toggle, None),
    EngineAutoStart => ("ENGINE_AUTO_START", Toggle, None),
    ElevTrimUp => ("ELEV_TRIM_UP", Toggle, Some(OverrideAxis::Elevator)),

    // Setpoints
    ApAltVarSet => ("AP_ALT_VAR_SET_ENGLISH", SetValue, Some(OverrideAxis::Alt)),
    ApVsVarSet => ("AP_VS_VAR_SET_ENGLISH", SetValue, Some(OverrideAxis::Vs)),
    ApSpdVarSet => ("AP_SPD_VAR_SET", SetValue, Some(OverrideAxis::Spd)),
    HeadingBugSet => ("HEADING_BUG_SET", SetValue, Some(OverrideAxis::Hdg)),
    ThrottleSet => ("THROTTLE_SET", SetValue, Some(OverrideAxis::Throttle)),
    MixtureSet => ("MIXTURE_SET", SetValue, Some(OverrideAxis::Mixture)),
    PropPitchSet => ("PROP_PITCH_SET", SetValue, None),
    ParkingBrakeSet => ("PARKING_BRAKE_SET", SetValue, Some(OverrideAxis::Brakes)),

    // Axes
    AxisElevatorSet => ("AXIS_ELEVATOR_SET", Axis, Some(OverrideAxis::Elevator)),
    AxisRudderSet => ("AXIS_RUDDER_SET", Axis, Some(OverrideAxis::Rudder)),
    AxisAileronsSet => ("AXIS_AILERONS_SET", Axis, Some(OverrideAxis::Ailerons)),
    AxisMixtureSet => ("AXIS_MIXTURE_SET", Axis, Some(OverrideAxis::Mixture)),
    SteeringSet => ("STEERING_SET", Axis, Some(OverrideAxis::Steering)),
    AxisLeftBrakeSet => ("AXIS_LEFT_BRAKE_SET", Axis, Some(OverrideAxis::Brakes)),
    AxisRightBrakeSet => ("AXIS_RIGHT_BRAKE_SET", Axis, Some(OverrideAxis::Brakes)),
}

impl CommandKind {
    /// Resolve an API-facing name: aliases first, then wire names.
    pub fn from_api_name(name: &str) -> Option<Self> {
        match name {
            // Short names that differ from the wire form
            "AP_ALT_VAR_SET" => Some(Self::ApAltVarSet),
            "AP_VS_VAR_SET" => Some(Self::ApVsVarSet),
            "AP_HDG_VAR_SET" => Some(Self::HeadingBugSet),
            "AP_SPD_HOLD" => Some(Self::ApSpdHold),
            "HEADING_BUG_INC" | "HEADING_BUG_DEC" => None,
            other => Self::from_wire_name(other),
        }
    }

    /// Setpoints that are never deduplicated; the bridge may restart and
    /// lose them, so they always resend.
    pub fn is_dedup_exempt(&self) -> bool {
        matches!(self, Self::ThrottleSet | Self::MixtureSet | Self::MixtureRich)
    }

    /// Momentary pulses that advance state one step per send (a flap notch,
    /// a trim click). They carry no held state to dedup against; the rule
    /// engine gates them on observed telemetry instead.
    pub fn is_momentary(&self) -> bool {
        matches!(
            self,
            Self::FlapsUp
                | Self::FlapsDown
                | Self::ElevTrimUp
                | Self::EngineAutoStart
                | Self::QuickPreflight
        )
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Value carried by a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandValue {
    /// Toggle engage/disengage.
    Bool(bool),
    /// Setpoint or axis deflection.
    Number(f64),
}

impl CommandValue {
    /// The numeric form, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(_) => None,
        }
    }

    /// Whether two values match for dedup purposes: booleans on equality,
    /// numbers within the given tolerance.
    pub fn matches(&self, other: &Self, tolerance: f64) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => (a - b).abs() < tolerance,
            _ => false,
        }
    }
}

/// A single control decision bound for the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command kind.
    pub kind: CommandKind,
    /// Value: bool for toggles, number for setpoints and axes.
    pub value: CommandValue,
    /// Human-readable reason, shown in logs and the UI.
    pub description: String,
    /// Scheduling priority.
    pub priority: Priority,
}

impl Command {
    /// A toggle command.
    pub fn toggle(kind: CommandKind, engage: bool, description: impl Into<String>) -> Self {
        Self {
            kind,
            value: CommandValue::Bool(engage),
            description: description.into(),
            priority: Priority::Normal,
        }
    }

    /// A setpoint command.
    pub fn set_value(kind: CommandKind, value: f64, description: impl Into<String>) -> Self {
        Self {
            kind,
            value: CommandValue::Number(value),
            description: description.into(),
            priority: Priority::Normal,
        }
    }

    /// An axis deflection command.
    pub fn axis(kind: CommandKind, value: f64, description: impl Into<String>) -> Self {
        Self {
            kind,
            value: CommandValue::Number(value),
            description: description.into(),
            priority: Priority::Normal,
        }
    }

    /// Raise the priority to High.
    pub fn with_high_priority(mut self) -> Self {
        self.priority = Priority::High;
        self
    }

    /// Whether the value's shape matches the kind's family.
    pub fn is_well_formed(&self) -> bool {
        match (self.kind.family(), &self.value) {
            (CommandFamily::Toggle, CommandValue::Bool(_)) => true,
            (CommandFamily::SetValue, CommandValue::Number(n)) => n.is_finite(),
            (CommandFamily::Axis, CommandValue::Number(n)) => n.is_finite(),
            _ => false,
        }
    }

    /// Build the wire form for the bridge transport.
    pub fn to_wire(&self) -> WireCommand {
        match self.kind.family() {
            CommandFamily::Toggle => WireCommand {
                event: self.kind.wire_name(),
                value: None,
            },
            CommandFamily::SetValue | CommandFamily::Axis => WireCommand {
                event: self.kind.wire_name(),
                value: self.value.as_number(),
            },
        }
    }
}

/// Wire form handed to the bridge transport: a bare event name for toggles,
/// or an event/value pair for value-set kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct WireCommand {
    /// External event name.
    pub event: &'static str,
    /// Value for value-set kinds.
    pub value: Option<f64>,
}
