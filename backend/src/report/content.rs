use image::RgbImage;
use image::imageops::{self, FilterType};
use shared::{Factor, Sex};

use super::Report;
use super::layout::{Block, IMAGE_DPI, MM_PER_INCH};
use crate::analysis::classes::AcneType;
use crate::analysis::factors::describe_value;

const PHOTO_WIDTH_IN: f32 = 4.0;
const PIE_DIAMETER_PT: f32 = 130.0;
const PIE_BOX_PT: f32 = 200.0;

fn acne_type_info(acne_type: AcneType) -> &'static str {
    match acne_type {
        AcneType::Neonatal => {
            "El acné neonatal es una condición común que afecta a aproximadamente el 20% de los recién nacidos. Suele aparecer en las mejillas y generalmente se resuelve por sí solo en unas pocas semanas o meses."
        }
        AcneType::Infantile => {
            "El acné infantil es menos común y puede aparecer entre los 3 y 6 meses de edad. Puede requerir tratamiento si persiste o es severo."
        }
        AcneType::Vulgar => {
            "El acné vulgar es el tipo más común, afectando hasta el 85% de los adolescentes y jóvenes adultos. Es causado por una combinación de factores, incluyendo la producción excesiva de sebo, bacterias y inflamación."
        }
        AcneType::Adult => {
            "El acné adulto afecta hasta el 15% de las mujeres y el 5% de los hombres mayores de 25 años. Puede ser causado por factores hormonales, estrés y ciertos productos para el cuidado de la piel."
        }
    }
}

fn factor_title(factor: Factor) -> &'static str {
    match factor {
        Factor::StressLevel => "Nivel de estrés",
        Factor::DietQuality => "Calidad de la dieta",
        Factor::SkinType => "Tipo de piel",
        Factor::SunExposure => "Exposición solar",
        Factor::MakeupUse => "Uso de maquillaje",
    }
}

fn factor_explanation(factor: Factor) -> &'static str {
    match factor {
        Factor::StressLevel => {
            "El estrés puede aumentar la producción de hormonas que estimulan las glándulas sebáceas, lo que puede empeorar el acné."
        }
        Factor::DietQuality => {
            "Una dieta rica en azúcares y grasas saturadas puede exacerbar el acné. Una dieta balanceada puede ayudar a reducir la inflamación."
        }
        Factor::SkinType => {
            "La piel grasa es más propensa al acné debido a la mayor producción de sebo."
        }
        Factor::SunExposure => {
            "La exposición al sol puede inicialmente mejorar el acné, pero a largo plazo puede empeorar la condición y aumentar el riesgo de daño cutáneo."
        }
        Factor::MakeupUse => {
            "El uso frecuente de maquillaje, especialmente de productos comedogénicos, puede obstruir los poros y empeorar el acné."
        }
    }
}

fn sex_label(sex: Sex) -> &'static str {
    match sex {
        Sex::Male => "Masculino",
        Sex::Female => "Femenino",
        Sex::Other => "Otro",
    }
}

const ROUTINE: [&str; 5] = [
    "1. Limpieza suave dos veces al día",
    "2. Uso de tónicos no alcohólicos",
    "3. Aplicación de tratamientos tópicos según lo recomendado",
    "4. Hidratación con productos no comedogénicos",
    "5. Protección solar diaria",
];

const DISCLAIMER: &str = "Este informe es generado por un sistema de análisis automatizado y no sustituye el diagnóstico profesional de un dermatólogo. Siempre consulte a un profesional de la salud para obtener un diagnóstico y tratamiento personalizados.";

/// Shrinks `image` so its longer side holds no more pixels than
/// `width_in` inches at print resolution.
fn fit_for_print(image: &RgbImage, width_in: f32) -> RgbImage {
    let max_px = (width_in * IMAGE_DPI).round() as u32;
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= max_px {
        return image.clone();
    }
    let scale = max_px as f32 / longest as f32;
    let resized = |px: u32| ((px as f32 * scale).round() as u32).max(1);
    imageops::resize(image, resized(width), resized(height), FilterType::Triangle)
}

fn points(pt: f32) -> f32 {
    pt * MM_PER_INCH / 72.0
}

/// Content list of the report, in reading order.
pub fn build_document(report: &Report<'_>) -> Vec<Block> {
    let mut blocks = Vec::new();
    let table = |widths: [f32; 2], rows: Vec<Vec<String>>, header: bool| Block::Table {
        widths: widths.iter().map(|inches| inches * MM_PER_INCH).collect(),
        rows,
        header,
    };

    // Cover
    blocks.push(Block::Title("Informe de Análisis de Acné".into()));
    blocks.push(Block::Spacer(12.0));
    blocks.push(Block::Heading2(format!("Preparado para: {}", report.patient.name)));
    blocks.push(Block::Spacer(4.0));
    blocks.push(Block::Paragraph(format!("Fecha: {}", report.date.format("%d/%m/%Y"))));
    blocks.push(Block::PageBreak);

    blocks.push(Block::Heading1("Información del Paciente".into()));
    blocks.push(table(
        [2.0, 4.0],
        vec![
            vec!["Nombre".into(), report.patient.name.clone()],
            vec!["Edad".into(), report.patient.age.to_string()],
            vec!["Sexo".into(), sex_label(report.patient.sex).into()],
        ],
        false,
    ));
    blocks.push(Block::Spacer(4.0));

    blocks.push(Block::Heading1("Diagnóstico".into()));
    blocks.push(Block::Heading2(format!("Tipo de Acné: {}", report.acne_type)));
    blocks.push(Block::Heading2(format!("Severidad: {}", report.severity)));
    blocks.push(Block::Paragraph(acne_type_info(report.acne_type).into()));
    blocks.push(Block::Spacer(4.0));

    blocks.push(Block::Heading1("Análisis de Imagen".into()));
    let photo = fit_for_print(report.annotated, PHOTO_WIDTH_IN);
    let (width_px, height_px) = photo.dimensions();
    blocks.push(Block::Image {
        pixels: photo.into_raw(),
        width_px,
        height_px,
        max_width: PHOTO_WIDTH_IN * MM_PER_INCH,
    });
    if report.detections.is_empty() {
        blocks.push(Block::Paragraph(
            "No se detectaron lesiones específicas en la imagen.".into(),
        ));
    } else {
        blocks.push(Block::Heading2("Lesiones Detectadas".into()));
        let mut rows: Vec<Vec<String>> = vec![vec!["Tipo de Lesión".into(), "Confianza".into()]];
        rows.extend(report.detections.iter().map(|detection| {
            vec![
                detection.class.label().to_string(),
                format!("{:.2}", detection.confidence),
            ]
        }));
        blocks.push(table([3.0, 1.0], rows, true));
    }
    blocks.push(Block::Spacer(4.0));

    blocks.push(Block::Heading1("Análisis de Factores".into()));
    blocks.push(Block::Paragraph(
        "Los siguientes factores pueden influir en la condición del acné:".into(),
    ));
    let mut rows: Vec<Vec<String>> = vec![vec!["Factor".into(), "Puntuación".into()]];
    rows.extend(
        report
            .scores
            .iter()
            .map(|(class, score)| vec![class.label().to_string(), format!("{:.2}", score)]),
    );
    blocks.push(table([3.0, 1.0], rows, true));
    blocks.push(Block::Pie {
        slices: report
            .scores
            .iter()
            .map(|(class, score)| (class.label().to_string(), score))
            .collect(),
        diameter: points(PIE_DIAMETER_PT),
        height: points(PIE_BOX_PT),
    });
    for (factor, value) in report.factors.iter() {
        blocks.push(Block::Paragraph(format!(
            "{} ({}): {}",
            factor_title(factor),
            describe_value(factor, value),
            factor_explanation(factor)
        )));
    }
    blocks.push(Block::Spacer(4.0));

    blocks.push(Block::Heading1("Recomendaciones Personalizadas".into()));
    blocks.extend(report.recommendations.iter().cloned().map(Block::Bullet));
    blocks.push(Block::Spacer(4.0));

    blocks.push(Block::Heading1("Información Adicional".into()));
    blocks.push(Block::Paragraph(
        "El acné es una condición común de la piel que afecta a millones de personas en todo el mundo. Aunque no es una condición grave, puede tener un impacto significativo en la autoestima y la calidad de vida. Es importante recordar que el acné es tratable y que existen muchas opciones disponibles para manejar esta condición.".into(),
    ));
    blocks.push(Block::Heading2("Rutina de cuidado de la piel recomendada:".into()));
    blocks.extend(ROUTINE.iter().map(|step| Block::Paragraph(step.to_string())));
    blocks.push(Block::Spacer(4.0));

    blocks.push(Block::Heading1("Conclusión".into()));
    blocks.push(Block::Paragraph(format!(
        "Basado en el análisis realizado, se ha determinado que usted tiene {} de severidad {}. Es importante seguir las recomendaciones proporcionadas y mantener una rutina de cuidado de la piel constante. Si los síntomas persisten o empeoran, se recomienda consultar a un dermatólogo para un tratamiento más específico.",
        report.acne_type,
        report.severity.label().to_lowercase()
    )));
    blocks.push(Block::Spacer(4.0));

    blocks.push(Block::Heading2("Aviso Legal".into()));
    blocks.push(Block::Paragraph(DISCLAIMER.into()));
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::sample_report;

    fn paragraphs(blocks: &[Block]) -> Vec<&str> {
        blocks
            .iter()
            .filter_map(|block| match block {
                Block::Paragraph(text) | Block::Heading1(text) | Block::Heading2(text) => {
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn document_covers_every_section() {
        let image = image::RgbImage::new(30, 20);
        let blocks = build_document(&sample_report(&image, true));
        let text = paragraphs(&blocks);
        for heading in [
            "Información del Paciente",
            "Diagnóstico",
            "Análisis de Imagen",
            "Lesiones Detectadas",
            "Análisis de Factores",
            "Recomendaciones Personalizadas",
            "Conclusión",
            "Aviso Legal",
        ] {
            assert!(text.contains(&heading), "missing {}", heading);
        }
        assert!(text.contains(&"Fecha: 16/10/2026"));
        assert!(text.iter().any(|t| t.starts_with("Nivel de estrés (7/10)")));
        assert!(text.iter().any(|t| t.starts_with("Tipo de piel (Normal)")));
        assert_eq!(blocks.iter().filter(|b| matches!(b, Block::PageBreak)).count(), 1);
    }

    #[test]
    fn scores_get_one_pie_chart() {
        let image = image::RgbImage::new(30, 20);
        let blocks = build_document(&sample_report(&image, true));
        let pies: Vec<&Vec<(String, f64)>> = blocks
            .iter()
            .filter_map(|block| match block {
                Block::Pie { slices, .. } => Some(slices),
                _ => None,
            })
            .collect();
        assert_eq!(pies.len(), 1);
        assert_eq!(*pies[0], vec![("Acné Inflamatorio".to_string(), 0.84)]);
    }

    #[test]
    fn large_photos_shrink_to_print_size() {
        let image = image::RgbImage::new(3000, 1000);
        let blocks = build_document(&sample_report(&image, false));
        let (width, height) = blocks
            .iter()
            .find_map(|block| match block {
                Block::Image { width_px, height_px, .. } => Some((*width_px, *height_px)),
                _ => None,
            })
            .unwrap();
        assert_eq!((width, height), (1200, 400));

        let small = image::RgbImage::new(300, 200);
        assert_eq!(fit_for_print(&small, PHOTO_WIDTH_IN).dimensions(), (300, 200));
    }

    #[test]
    fn missing_lesions_are_stated() {
        let image = image::RgbImage::new(30, 20);
        let blocks = build_document(&sample_report(&image, false));
        let text = paragraphs(&blocks);
        assert!(text.contains(&"No se detectaron lesiones específicas en la imagen."));
        assert!(!text.contains(&"Lesiones Detectadas"));
    }

    #[test]
    fn recommendations_become_bullets_in_order() {
        let image = image::RgbImage::new(30, 20);
        let report = sample_report(&image, false);
        let bullets: Vec<String> = build_document(&report)
            .into_iter()
            .filter_map(|block| match block {
                Block::Bullet(text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(bullets, report.recommendations);
    }
}
