use crate::{
    bson::Document,
    linq::{ast::AstStage, Serializer},
};

/// The stages translated so far and the serializer of the documents they output.
///
/// Translators never modify a pipeline in place. Each one consumes the pipeline it extends and
/// returns the extended one.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslatedPipeline {
    stages: Vec<AstStage>,
    output_serializer: Serializer,
}

impl TranslatedPipeline {
    /// An empty pipeline over documents of `input_serializer`.
    pub fn new(input_serializer: Serializer) -> Self {
        Self {
            stages: Vec::new(),
            output_serializer: input_serializer,
        }
    }

    /// The pipeline with `stages` appended, outputting documents of `output_serializer`.
    pub fn add_stages(
        mut self,
        output_serializer: Serializer,
        stages: impl IntoIterator<Item = AstStage>,
    ) -> Self {
        self.stages.extend(stages);
        self.output_serializer = output_serializer;
        self
    }

    /// The pipeline with its last stage swapped for `stage`.
    pub(crate) fn replace_last_stage(mut self, output_serializer: Serializer, stage: AstStage) -> Self {
        self.stages.pop();
        self.add_stages(output_serializer, [stage])
    }

    pub fn stages(&self) -> &[AstStage] {
        &self.stages
    }

    pub fn last_stage(&self) -> Option<&AstStage> {
        self.stages.last()
    }

    pub fn output_serializer(&self) -> &Serializer {
        &self.output_serializer
    }

    /// The pipeline as the documents sent in an `aggregate` command.
    pub fn render(&self) -> Vec<Document> {
        self.stages.iter().map(AstStage::render).collect()
    }
}
