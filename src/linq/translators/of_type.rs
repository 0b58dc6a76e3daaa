use crate::{
    bson::Bson,
    linq::{
        ast::{AstComparison, AstFilter, AstStage},
        translators::{QueryCall, Result, StageTranslator, TranslatedPipeline},
        DocumentSerializer,
        Expression,
        Serializer,
    },
};

/// `OfType(source, Type)` matches the discriminator of a type derived from the source's document
/// type, and continues with that type's serializer.
pub(super) struct OfTypeStageTranslator;

impl StageTranslator for OfTypeStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[2])?;
        let type_name = match call.argument(1)? {
            Expression::TypeName(type_name) => type_name,
            _ => return Err(call.unsupported("the type argument is not a type name")),
        };

        let document = match pipeline.output_serializer() {
            Serializer::Document(document) => document,
            other => {
                return Err(call.unsupported(format!(
                    "{} is not a document type",
                    other.type_name()
                )))
            }
        };
        if document.type_name() == type_name {
            return Ok(pipeline);
        }
        let derived = document.find_derived(type_name).ok_or_else(|| {
            call.unsupported(format!(
                "{type_name} is not a type derived from {}",
                document.type_name()
            ))
        })?;

        let filter = AstFilter::Field {
            path: DocumentSerializer::DISCRIMINATOR_ELEMENT.to_string(),
            comparison: AstComparison::Eq(Bson::String(derived.discriminator_value().to_string())),
        };
        let serializer = Serializer::Document(derived.clone());
        Ok(pipeline.add_stages(serializer, [AstStage::Match(filter)]))
    }
}
