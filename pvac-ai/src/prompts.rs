//! Static prompt text sent to vision backends

/// System prompt: strict JSON-only visual measurement behavior
pub const SYSTEM_PROMPT: &str = "\
You are a visual measurement engine.

Respond with ONLY one valid JSON object. No explanations, no markdown,
no code fences, no surrounding text.

Judge ONLY what is directly visible in the product image.
Do not infer brand, price, quality or commercial intent.
Do not measure physical size or estimate real-world dimensions.

When a judgment cannot be made confidently from the image, mark it
explicitly as \"uncertain\".

The JSON object must match the required schema exactly.
";

/// Task prompt: the five independent visual dimensions
pub const TASK_PROMPT: &str = "\
Task: analyze the visual appearance of the product in the image.

Score each of these independent dimensions on a continuous scale from
-5.0 to +5.0:

1. gender_expression: -5.0 strongly masculine, 0.0 visually unisex,
   +5.0 strongly feminine
2. visual_weight: -5.0 very light, minimal, sleek; +5.0 very heavy, bold, thick
3. embellishment: -5.0 plain, minimal design; +5.0 highly ornate or decorative
4. unconventionality: -5.0 classic, traditional; +5.0 avant-garde
5. formality: -5.0 very casual tone; +5.0 very formal tone

Return them under \"visual_measurements\", one object per dimension:
{\"score\": <number in [-5.0, 5.0]>, \"justification\": <short visual reason>,
 \"uncertain\": <true|false>}
";

/// Attribute prompt: observable categorical attributes
pub const ATTRIBUTE_PROMPT: &str = "\
Also report these observable attributes under \"attributes\", ONLY when
clearly visible. Otherwise use the value \"uncertain\".

- frame_geometry: rectangle, square, circle, oval, ellipse, triangle, polygon
- transparency: opaque, translucent, transparent
- dominant_colors: list of the main colors
- visible_texture: short description of surface texture or pattern
- visible_wirecore: yes or no
- suitable_for_kids: yes or no, ONLY when visually obvious

Never infer attributes that cannot be seen.
Optionally add a short \"confidence_notes\" string about image quality.
";

/// Guidance when several images of one product are sent
pub const MULTI_IMAGE_INSTRUCTION: &str = "\
Several images of the same product may be provided:
- analyze each image on its own
- do not assume every image shows the same details
- return one structured result per image

Cross-image aggregation happens outside the model.
";

/// Prompts for one vision call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub system: String,
    pub task: String,
}

impl PromptSet {
    /// System prompt plus the task and attribute prompts
    pub fn standard() -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            task: format!("{}\n{}", TASK_PROMPT, ATTRIBUTE_PROMPT),
        }
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::standard()
    }
}
