//! Structured decoding of serialized training examples.
//!
//! A record stores every array as one raw little-endian byte string. Decoding is a
//! pure reshape: the byte count must match the declared shape exactly, and nothing
//! is normalized, padded or truncated.

use std::collections::HashMap;

use burn::tensor::TensorData;
use byteorder::{ByteOrder, LittleEndian};
use prost::Message;

use super::{
    fields,
    proto::{Example, Feature, Features, feature::Kind},
};
use crate::{
    config::CrfConfig,
    error::{PiecewiseError, PiecewiseResult},
};

/// Width in bytes of every raw array element (`f32` and `i32`).
const ELEMENT_BYTES: usize = 4;

/// Expected element counts for one example, derived from a [`CrfConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// `[H, W, D]`
    pub image_shape: [usize; 3],
    /// Unary sites on the subsampled grid.
    pub unary_sites: usize,
    /// Full-resolution pixels, `H * W`.
    pub pixels: usize,
    /// Surrounding-neighbourhood pairs, `K_surr`.
    pub neighbours_surr: usize,
    /// Above/below-neighbourhood pairs, `K_ab`.
    pub neighbours_ab: usize,
}

impl RecordLayout {
    pub const fn from_config(config: &CrfConfig) -> Self {
        Self {
            image_shape: [config.img_height, config.img_width, config.img_depth],
            unary_sites: config.num_unary_sites(),
            pixels: config.num_pixels(),
            neighbours_surr: config.neighbours_surr,
            neighbours_ab: config.neighbours_ab,
        }
    }

    pub const fn image_len(&self) -> usize {
        self.image_shape[0] * self.image_shape[1] * self.image_shape[2]
    }
}

/// The persisted form of one example, with arrays held as flat vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredExample {
    pub height: i64,
    pub width: i64,
    pub depth: i64,
    pub name: String,
    pub image: Vec<f32>,
    pub labels_unary: Vec<i32>,
    pub labels_orig: Vec<i32>,
    pub weights_unary: Vec<f32>,
    pub labels_surr: Vec<i32>,
    pub weights_surr: Vec<f32>,
    pub labels_ab: Vec<i32>,
    pub weights_ab: Vec<f32>,
}

impl StoredExample {
    /// Serializes the example into `tf.train.Example` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut feature = HashMap::with_capacity(12);
        feature.insert(fields::HEIGHT.to_owned(), Feature::int64(self.height));
        feature.insert(fields::WIDTH.to_owned(), Feature::int64(self.width));
        feature.insert(fields::DEPTH.to_owned(), Feature::int64(self.depth));
        feature.insert(
            fields::NAME.to_owned(),
            Feature::bytes(self.name.as_bytes().to_vec()),
        );
        feature.insert(fields::IMAGE.to_owned(), Feature::bytes(f32_bytes(&self.image)));
        feature.insert(
            fields::LABELS_UNARY.to_owned(),
            Feature::bytes(i32_bytes(&self.labels_unary)),
        );
        feature.insert(
            fields::LABELS_ORIG.to_owned(),
            Feature::bytes(i32_bytes(&self.labels_orig)),
        );
        feature.insert(
            fields::WEIGHTS_UNARY.to_owned(),
            Feature::bytes(f32_bytes(&self.weights_unary)),
        );
        feature.insert(
            fields::LABELS_SURR.to_owned(),
            Feature::bytes(i32_bytes(&self.labels_surr)),
        );
        feature.insert(
            fields::WEIGHTS_SURR.to_owned(),
            Feature::bytes(f32_bytes(&self.weights_surr)),
        );
        feature.insert(
            fields::LABELS_AB.to_owned(),
            Feature::bytes(i32_bytes(&self.labels_ab)),
        );
        feature.insert(
            fields::WEIGHTS_AB.to_owned(),
            Feature::bytes(f32_bytes(&self.weights_ab)),
        );

        Example {
            features: Some(Features { feature }),
        }
        .encode_to_vec()
    }
}

/// One decoded example with every array reshaped to its contract shape.
///
/// Arrays are returned as raw [`TensorData`]; the batcher turns them into tensors
/// on the training device.
#[derive(Debug, Clone)]
pub struct DecodedExample {
    /// `[H, W, D]` f32
    pub image: TensorData,
    /// `[N_unary]` i32
    pub labels_unary: TensorData,
    /// `[H * W]` i32
    pub labels_orig: TensorData,
    /// `[K_surr]` i32 joint class-pair ids
    pub labels_surr: TensorData,
    /// `[K_ab]` i32 joint class-pair ids
    pub labels_ab: TensorData,
    pub name: String,
    /// `[N_unary]` f32
    pub weights_unary: TensorData,
    /// `[K_surr]` f32
    pub weights_surr: TensorData,
    /// `[K_ab]` f32
    pub weights_ab: TensorData,
}

/// Decodes serialized examples against a fixed [`RecordLayout`].
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    layout: RecordLayout,
}

impl RecordDecoder {
    /// Creates a decoder for records written with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PiecewiseError::InvalidConfiguration`] if the configuration fails
    /// validation.
    pub fn new(config: &CrfConfig) -> PiecewiseResult<Self> {
        config.validate()?;
        Ok(Self {
            layout: RecordLayout::from_config(config),
        })
    }

    pub const fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Decodes one serialized record.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the bytes are not an example message, if a field is
    /// missing or of the wrong kind, if the stored geometry disagrees with the
    /// configuration, or if any array does not reshape exactly into its shape.
    pub fn decode(&self, bytes: &[u8]) -> PiecewiseResult<DecodedExample> {
        let example = Example::decode(bytes)
            .map_err(|source| PiecewiseError::InvalidRecordEncoding { source })?;
        let features = example.features.unwrap_or_default().feature;
        let layout = &self.layout;

        for (field, expected) in [
            (fields::HEIGHT, layout.image_shape[0]),
            (fields::WIDTH, layout.image_shape[1]),
            (fields::DEPTH, layout.image_shape[2]),
        ] {
            let stored = int64_scalar(&features, field)?;
            if usize::try_from(stored).ok() != Some(expected) {
                return Err(PiecewiseError::MalformedRecord {
                    field,
                    reason: format!("stored value {stored} does not match configured {expected}"),
                });
            }
        }

        let name = String::from_utf8_lossy(bytes_scalar(&features, fields::NAME)?).into_owned();

        let image = decode_f32(&features, fields::IMAGE, layout.image_len())?;
        let labels_unary = decode_i32(&features, fields::LABELS_UNARY, layout.unary_sites)?;
        let labels_orig = decode_i32(&features, fields::LABELS_ORIG, layout.pixels)?;
        let labels_surr = decode_i32(&features, fields::LABELS_SURR, layout.neighbours_surr)?;
        let labels_ab = decode_i32(&features, fields::LABELS_AB, layout.neighbours_ab)?;
        let weights_unary = decode_f32(&features, fields::WEIGHTS_UNARY, layout.unary_sites)?;
        let weights_surr = decode_f32(&features, fields::WEIGHTS_SURR, layout.neighbours_surr)?;
        let weights_ab = decode_f32(&features, fields::WEIGHTS_AB, layout.neighbours_ab)?;

        tracing::debug!(name = %name, bytes = bytes.len(), "decoded record");

        Ok(DecodedExample {
            image: TensorData::new(image, layout.image_shape),
            labels_unary: TensorData::new(labels_unary, [layout.unary_sites]),
            labels_orig: TensorData::new(labels_orig, [layout.pixels]),
            labels_surr: TensorData::new(labels_surr, [layout.neighbours_surr]),
            labels_ab: TensorData::new(labels_ab, [layout.neighbours_ab]),
            name,
            weights_unary: TensorData::new(weights_unary, [layout.unary_sites]),
            weights_surr: TensorData::new(weights_surr, [layout.neighbours_surr]),
            weights_ab: TensorData::new(weights_ab, [layout.neighbours_ab]),
        })
    }
}

fn feature_kind<'a>(
    features: &'a HashMap<String, Feature>,
    field: &'static str,
) -> PiecewiseResult<&'a Kind> {
    features
        .get(field)
        .and_then(|feature| feature.kind.as_ref())
        .ok_or(PiecewiseError::MissingField { field })
}

fn bytes_scalar<'a>(
    features: &'a HashMap<String, Feature>,
    field: &'static str,
) -> PiecewiseResult<&'a [u8]> {
    match feature_kind(features, field)? {
        Kind::BytesList(list) if list.value.len() == 1 => Ok(&list.value[0]),
        Kind::BytesList(list) => Err(PiecewiseError::MalformedRecord {
            field,
            reason: format!("expected one byte string, found {}", list.value.len()),
        }),
        _ => Err(PiecewiseError::MalformedRecord {
            field,
            reason: "expected a byte string feature".to_owned(),
        }),
    }
}

fn int64_scalar(features: &HashMap<String, Feature>, field: &'static str) -> PiecewiseResult<i64> {
    match feature_kind(features, field)? {
        Kind::Int64List(list) if list.value.len() == 1 => Ok(list.value[0]),
        Kind::Int64List(list) => Err(PiecewiseError::MalformedRecord {
            field,
            reason: format!("expected one integer, found {}", list.value.len()),
        }),
        _ => Err(PiecewiseError::MalformedRecord {
            field,
            reason: "expected an int64 feature".to_owned(),
        }),
    }
}

/// Checks that `bytes` holds exactly `expected` four-byte elements.
fn check_raw_len(field: &'static str, bytes: &[u8], expected: usize) -> PiecewiseResult<()> {
    if bytes.len() % ELEMENT_BYTES != 0 {
        return Err(PiecewiseError::MalformedRecord {
            field,
            reason: format!(
                "byte length {} is not a multiple of {ELEMENT_BYTES}",
                bytes.len()
            ),
        });
    }
    let found = bytes.len() / ELEMENT_BYTES;
    if found != expected {
        return Err(PiecewiseError::MalformedRecord {
            field,
            reason: format!("decodes to {found} elements, expected {expected}"),
        });
    }
    Ok(())
}

fn decode_f32(
    features: &HashMap<String, Feature>,
    field: &'static str,
    expected: usize,
) -> PiecewiseResult<Vec<f32>> {
    let bytes = bytes_scalar(features, field)?;
    check_raw_len(field, bytes, expected)?;
    let mut values = vec![0.0f32; expected];
    LittleEndian::read_f32_into(bytes, &mut values);
    Ok(values)
}

fn decode_i32(
    features: &HashMap<String, Feature>,
    field: &'static str,
    expected: usize,
) -> PiecewiseResult<Vec<i32>> {
    let bytes = bytes_scalar(features, field)?;
    check_raw_len(field, bytes, expected)?;
    let mut values = vec![0i32; expected];
    LittleEndian::read_i32_into(bytes, &mut values);
    Ok(values)
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * ELEMENT_BYTES];
    LittleEndian::write_f32_into(values, &mut bytes);
    bytes
}

fn i32_bytes(values: &[i32]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * ELEMENT_BYTES];
    LittleEndian::write_i32_into(values, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::tests::{sample_example, small_config};

    fn decoder() -> RecordDecoder {
        RecordDecoder::new(&small_config()).unwrap()
    }

    /// Re-encodes `example` after letting `edit` change its feature map.
    fn edited(
        example: &StoredExample,
        edit: impl FnOnce(&mut HashMap<String, Feature>),
    ) -> Vec<u8> {
        let mut message = Example::decode(example.encode().as_slice()).unwrap();
        let features = message.features.as_mut().unwrap();
        edit(&mut features.feature);
        message.encode_to_vec()
    }

    #[test]
    fn decode_reshapes_every_array_to_its_contract_shape() {
        let config = small_config();
        let stored = sample_example(&config);

        let decoded = decoder().decode(&stored.encode()).unwrap();

        assert_eq!(decoded.image.shape, vec![4, 6, 3]);
        assert_eq!(decoded.labels_unary.shape, vec![6]);
        assert_eq!(decoded.weights_unary.shape, vec![6]);
        assert_eq!(decoded.labels_orig.shape, vec![24]);
        assert_eq!(decoded.labels_surr.shape, vec![5]);
        assert_eq!(decoded.weights_surr.shape, vec![5]);
        assert_eq!(decoded.labels_ab.shape, vec![3]);
        assert_eq!(decoded.weights_ab.shape, vec![3]);
        assert_eq!(decoded.name, stored.name);
    }

    #[test]
    fn decode_preserves_values_bit_for_bit() {
        let config = small_config();
        let mut stored = sample_example(&config);
        stored.image[0] = -0.0;
        stored.image[1] = f32::MIN_POSITIVE / 2.0;
        stored.image[2] = f32::from_bits(0x7fc0_1234);
        stored.weights_surr[0] = 1.0e30;

        let decoded = decoder().decode(&stored.encode()).unwrap();

        let bits = |values: &[f32]| values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        let image = decoded.image.to_vec::<f32>().unwrap();
        assert_eq!(bits(&image), bits(&stored.image));
        let weights_surr = decoded.weights_surr.to_vec::<f32>().unwrap();
        assert_eq!(bits(&weights_surr), bits(&stored.weights_surr));
        assert_eq!(decoded.labels_orig.to_vec::<i32>().unwrap(), stored.labels_orig);
        assert_eq!(decoded.labels_surr.to_vec::<i32>().unwrap(), stored.labels_surr);
        assert_eq!(decoded.labels_ab.to_vec::<i32>().unwrap(), stored.labels_ab);
        assert_eq!(decoded.weights_ab.to_vec::<f32>().unwrap(), stored.weights_ab);
    }

    #[test]
    fn decode_rejects_byte_length_that_does_not_divide_into_elements() {
        let stored = sample_example(&small_config());
        let bytes = edited(&stored, |features| {
            let mut raw = f32_bytes(&stored.weights_unary);
            raw.push(0);
            features.insert(fields::WEIGHTS_UNARY.to_owned(), Feature::bytes(raw));
        });

        let err = decoder().decode(&bytes).unwrap_err();
        assert!(
            matches!(
                err,
                PiecewiseError::MalformedRecord { field, .. } if field == fields::WEIGHTS_UNARY
            ),
            "{err}"
        );
    }

    #[test]
    fn decode_rejects_element_count_mismatch_instead_of_truncating() {
        let config = small_config();
        let mut stored = sample_example(&config);
        stored.labels_surr.push(0);

        let err = decoder().decode(&stored.encode()).unwrap_err();
        assert!(err.to_string().contains("decodes to 6 elements, expected 5"), "{err}");
    }

    #[test]
    fn decode_rejects_missing_field() {
        let stored = sample_example(&small_config());
        let bytes = edited(&stored, |features| {
            features.remove(fields::LABELS_AB);
        });

        let err = decoder().decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            PiecewiseError::MissingField { field } if field == fields::LABELS_AB
        ));
    }

    #[test]
    fn decode_rejects_field_of_wrong_kind() {
        let stored = sample_example(&small_config());
        let bytes = edited(&stored, |features| {
            features.insert(fields::IMAGE.to_owned(), Feature::int64(1));
        });

        assert!(matches!(
            decoder().decode(&bytes),
            Err(PiecewiseError::MalformedRecord { field, .. }) if field == fields::IMAGE
        ));
    }

    #[test]
    fn decode_rejects_geometry_that_disagrees_with_configuration() {
        let mut stored = sample_example(&small_config());
        stored.height = 8;

        assert!(matches!(
            decoder().decode(&stored.encode()),
            Err(PiecewiseError::MalformedRecord { field, .. }) if field == fields::HEIGHT
        ));
    }

    #[test]
    fn decode_rejects_bytes_that_are_not_an_example() {
        let err = decoder().decode(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, PiecewiseError::InvalidRecordEncoding { .. }));
    }

    /// A valid geometry and a stored example filled with arbitrary bit patterns.
    fn geometry_and_example() -> impl Strategy<Value = (CrfConfig, StoredExample)> {
        (1usize..4, 1usize..4, 1usize..4, 1usize..4, 1usize..5, 1usize..9, 1usize..9)
            .prop_flat_map(|(rows, cols, subsample, depth, classes, surr, ab)| {
                let config = CrfConfig::new(
                    rows * subsample,
                    cols * subsample,
                    depth,
                    subsample,
                    classes,
                    1,
                    surr,
                    ab,
                );
                let floats = |len: usize| {
                    prop::collection::vec(any::<u32>().prop_map(f32::from_bits), len)
                };
                let ints = |len: usize| prop::collection::vec(any::<i32>(), len);
                let unary = config.num_unary_sites();
                (
                    Just(config.clone()),
                    floats(config.image_len()),
                    ints(unary),
                    ints(config.num_pixels()),
                    floats(unary),
                    (ints(surr), floats(surr), ints(ab), floats(ab)),
                    ".{0,24}",
                )
            })
            .prop_map(
                |(config, image, labels_unary, labels_orig, weights_unary, pairwise, name)| {
                    let (labels_surr, weights_surr, labels_ab, weights_ab) = pairwise;
                    let example = StoredExample {
                        height: config.img_height as i64,
                        width: config.img_width as i64,
                        depth: config.img_depth as i64,
                        name,
                        image,
                        labels_unary,
                        labels_orig,
                        weights_unary,
                        labels_surr,
                        weights_surr,
                        labels_ab,
                        weights_ab,
                    };
                    (config, example)
                },
            )
    }

    fn bits(values: &[f32]) -> Vec<u32> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn decode_is_lossless_for_any_valid_geometry((config, stored) in geometry_and_example()) {
            let decoded = RecordDecoder::new(&config).unwrap().decode(&stored.encode()).unwrap();

            prop_assert_eq!(
                decoded.image.shape.clone(),
                vec![config.img_height, config.img_width, config.img_depth]
            );
            prop_assert_eq!(decoded.labels_unary.shape.clone(), vec![config.num_unary_sites()]);
            prop_assert_eq!(decoded.labels_orig.shape.clone(), vec![config.num_pixels()]);
            prop_assert_eq!(decoded.labels_surr.shape.clone(), vec![config.neighbours_surr]);
            prop_assert_eq!(decoded.labels_ab.shape.clone(), vec![config.neighbours_ab]);

            prop_assert_eq!(bits(&decoded.image.to_vec::<f32>().unwrap()), bits(&stored.image));
            prop_assert_eq!(
                bits(&decoded.weights_unary.to_vec::<f32>().unwrap()),
                bits(&stored.weights_unary)
            );
            prop_assert_eq!(
                bits(&decoded.weights_surr.to_vec::<f32>().unwrap()),
                bits(&stored.weights_surr)
            );
            prop_assert_eq!(
                bits(&decoded.weights_ab.to_vec::<f32>().unwrap()),
                bits(&stored.weights_ab)
            );
            prop_assert_eq!(decoded.labels_unary.to_vec::<i32>().unwrap(), stored.labels_unary);
            prop_assert_eq!(decoded.labels_orig.to_vec::<i32>().unwrap(), stored.labels_orig);
            prop_assert_eq!(decoded.labels_surr.to_vec::<i32>().unwrap(), stored.labels_surr);
            prop_assert_eq!(decoded.labels_ab.to_vec::<i32>().unwrap(), stored.labels_ab);
            prop_assert_eq!(decoded.name, stored.name);
        }
    }

    #[test]
    fn decoder_rejects_invalid_configuration() {
        let config = CrfConfig {
            subsample_factor: 5,
            ..small_config()
        };
        assert!(RecordDecoder::new(&config).is_err());
    }
}
