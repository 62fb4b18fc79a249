use image::RgbImage;
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::yolo::{YoloDecoder, letterbox};
use super::{Detector, InferenceError, RawDetection};

/// TorchScript export of the lesion detector.
pub struct TorchDetector {
    model: Mutex<CModule>,
    device: Device,
    decoder: YoloDecoder,
}

impl TorchDetector {
    pub fn load(model_path: &Path, decoder: YoloDecoder) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(model_path, device)?;
        log::info!("Loaded detector {} on {:?}", model_path.display(), device);
        Ok(Self {
            model: Mutex::new(model),
            device,
            decoder,
        })
    }

    fn to_tensor(&self, image: &RgbImage) -> Tensor {
        let (width, height) = image.dimensions();
        let pixels = Tensor::from_slice(image.as_raw())
            .view([height as i64, width as i64, 3])
            .permute([2, 0, 1])
            .to_kind(Kind::Float);
        (pixels / 255.0).unsqueeze(0).to_device(self.device)
    }
}

impl Detector for TorchDetector {
    fn predict(&self, image: &RgbImage) -> Result<Vec<RawDetection>, InferenceError> {
        let (input, geometry) = letterbox(image, self.decoder.input_size)?;
        let tensor = self.to_tensor(&input);

        let output = {
            let model = self.model.lock().map_err(|_| InferenceError::Poisoned)?;
            tch::no_grad(|| model.forward_ts(&[&tensor]))?
        };

        let output = output.to_device(Device::Cpu).to_kind(Kind::Float).contiguous();
        let shape: Vec<usize> = output.size().iter().map(|&d| d as usize).collect();
        let flat = output.view([-1]);
        let num_elements = flat.size()[0] as usize;
        let mut data = vec![0.0f32; num_elements];
        flat.copy_data(&mut data, num_elements);

        self.decoder.decode(&data, &shape, &geometry)
    }
}
