//! Recipe representation sent to fixture firmware.

use serde::{Deserialize, Serialize};

use super::RecipeStep;
use crate::fixture::{Envelope, FixtureInfo};

/// Envelope kind for recipe commands.
pub const RECIPE_KIND: &str = "recipe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FormMode {
    #[default]
    #[serde(rename = "FORM_MODE_UNKNOWN_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "FORM_MODE_CC")]
    ConstantCurrent,
    #[serde(rename = "FORM_MODE_CV")]
    ConstantVoltage,
    #[serde(rename = "FORM_MODE_DELAY")]
    Delay,
}

impl FormMode {
    /// Map an ingredient mode string; unknown names map to `Unspecified`.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "FORM_MODE_CC" => FormMode::ConstantCurrent,
            "FORM_MODE_CV" => FormMode::ConstantVoltage,
            "FORM_MODE_DELAY" => FormMode::Delay,
            _ => FormMode::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EndingStyle {
    #[default]
    #[serde(rename = "ENDING_STYLE_UNKNOWN_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "ENDING_STYLE_CELL_BYPASS_ENABLE")]
    CellBypassEnable,
}

impl EndingStyle {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "ENDING_STYLE_CELL_BYPASS_ENABLE" => EndingStyle::CellBypassEnable,
            _ => EndingStyle::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormRequest {
    #[default]
    Start,
    Stop,
    Pause,
    Resume,
    FaultReset,
}

/// One step as the firmware expects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireStep {
    pub mode: FormMode,
    pub ending_style: EndingStyle,
    pub charge_current: f32,
    pub max_current: f32,
    pub cutoff_voltage: f32,
    pub cutoff_current: f32,
    pub cutoff_dv: f32,
    pub charge_power: f32,
    pub cutoff_ah: f32,
    pub v_cell_min_quality: f32,
    pub v_cell_max_quality: f32,
    pub step_timeout: f32,
}

impl From<&RecipeStep> for WireStep {
    fn from(step: &RecipeStep) -> Self {
        let v = &step.values;
        Self {
            mode: FormMode::from_name(&v.mode),
            ending_style: EndingStyle::from_name(&v.ending_style),
            charge_current: v.charge_current,
            max_current: v.max_current,
            cutoff_voltage: v.cutoff_voltage,
            cutoff_current: v.cutoff_current,
            cutoff_dv: v.cutoff_dv,
            charge_power: v.charge_power,
            cutoff_ah: v.cutoff_ah,
            v_cell_min_quality: v.v_cell_min_quality,
            v_cell_max_quality: v.v_cell_max_quality,
            step_timeout: v.step_timeout,
        }
    }
}

/// Command that starts a recipe on a fixture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeCommand {
    pub info: FixtureInfo,
    /// Tray orientation number (A=1 .. D=4)
    pub orientation: u8,
    pub form_request: FormRequest,
    pub steps: Vec<WireStep>,
    pub cell_masks: Vec<u32>,
}

impl RecipeCommand {
    pub fn start(
        info: FixtureInfo,
        orientation: u8,
        steps: &[RecipeStep],
        cell_masks: Vec<u32>,
    ) -> Self {
        Self {
            info,
            orientation,
            form_request: FormRequest::Start,
            steps: steps.iter().map(WireStep::from).collect(),
            cell_masks,
        }
    }

    /// Wrap into a frame addressed to `fixture`.
    pub fn to_envelope(&self, fixture: impl Into<String>) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            fixture: fixture.into(),
            kind: RECIPE_KIND.to_string(),
            payload: serde_json::to_value(self)?,
        })
    }

    /// Extract a command from a frame, `None` for other kinds.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        if envelope.kind != RECIPE_KIND {
            return None;
        }
        serde_json::from_value(envelope.payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Ingredients;

    #[test]
    fn test_mode_mapping() {
        assert_eq!(FormMode::from_name("FORM_MODE_CC"), FormMode::ConstantCurrent);
        assert_eq!(FormMode::from_name("FORM_MODE_DELAY"), FormMode::Delay);
        assert_eq!(FormMode::from_name("FORM_REQ_CC"), FormMode::Unspecified);
        assert_eq!(
            EndingStyle::from_name("ENDING_STYLE_CELL_BYPASS_ENABLE"),
            EndingStyle::CellBypassEnable
        );
        assert_eq!(EndingStyle::from_name(""), EndingStyle::Unspecified);
    }

    #[test]
    fn test_command_envelope() {
        let step = RecipeStep {
            name: "charge".to_string(),
            values: Ingredients {
                mode: "FORM_MODE_CV".to_string(),
                cutoff_voltage: 4.1,
                ..Default::default()
            },
        };
        let info = FixtureInfo {
            transaction_id: "txn-1".to_string(),
            ..Default::default()
        };
        let cmd = RecipeCommand::start(info, 1, &[step], vec![0b1011]);

        let envelope = cmd.to_envelope("01-01").unwrap();
        assert_eq!(envelope.kind, RECIPE_KIND);
        assert_eq!(envelope.payload["form_request"], "START");
        assert_eq!(envelope.payload["steps"][0]["mode"], "FORM_MODE_CV");

        let back = RecipeCommand::from_envelope(&envelope).unwrap();
        assert_eq!(back.info.transaction_id, "txn-1");
        assert_eq!(back.cell_masks, vec![0b1011]);
    }
}
