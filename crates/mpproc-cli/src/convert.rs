use anyhow::{Context, Result};
use rmpv::Value;
use serde_json::{Map, Value as Json};

pub fn json_to_mp(v: &Json) -> Value {
    match v {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => {
            if let Some(u) = n.as_u64() {
                Value::from(u)
            } else if let Some(i) = n.as_i64() {
                Value::from(i)
            } else {
                Value::F64(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => Value::Array(items.iter().map(json_to_mp).collect()),
        Json::Object(obj) => Value::Map(
            obj.iter()
                .map(|(k, v)| (Value::from(k.as_str()), json_to_mp(v)))
                .collect(),
        ),
    }
}

fn float_to_json(f: f64) -> Json {
    serde_json::Number::from_f64(f)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// Lossy JSON view of a MessagePack value: binary and ext payloads become hex.
pub fn mp_to_json(v: &Value) -> Json {
    match v {
        Value::Nil => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => {
            if let Some(u) = i.as_u64() {
                Json::from(u)
            } else if let Some(x) = i.as_i64() {
                Json::from(x)
            } else {
                Json::Null
            }
        }
        Value::F32(f) => float_to_json(f64::from(*f)),
        Value::F64(f) => float_to_json(*f),
        Value::String(s) => match s.as_str() {
            Some(s) => Json::from(s),
            None => Json::from(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        },
        Value::Binary(b) => Json::from(hex::encode(b)),
        Value::Array(items) => Json::Array(items.iter().map(mp_to_json).collect()),
        Value::Map(entries) => {
            let mut obj = Map::new();
            for (k, v) in entries {
                let key = match k.as_str() {
                    Some(s) => s.to_string(),
                    None => mp_to_json(k).to_string(),
                };
                obj.insert(key, mp_to_json(v));
            }
            Json::Object(obj)
        }
        Value::Ext(tag, data) => serde_json::json!({
            "ext": tag,
            "data": hex::encode(data),
        }),
    }
}

pub fn encode(v: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    rmpv::encode::write_value(&mut out, v).context("encode MessagePack")?;
    Ok(out)
}

/// Decodes every value in `mp`; a returned buffer may hold several.
pub fn decode_all(mp: &[u8]) -> Result<Vec<Value>> {
    let mut cur = mp;
    let mut out = Vec::new();
    while !cur.is_empty() {
        let offset = mp.len() - cur.len();
        let v = rmpv::decode::read_value(&mut cur)
            .with_context(|| format!("decode returned MessagePack at byte {offset}"))?;
        out.push(v);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_args_encode_to_compact_msgpack() {
        let mp = encode(&json_to_mp(&json!([1, 2]))).unwrap();
        assert_eq!(mp, vec![0x92, 0x01, 0x02]);

        let mp = encode(&json_to_mp(&json!([4294967295u64, 1]))).unwrap();
        assert_eq!(mp, vec![0x92, 0xce, 0xff, 0xff, 0xff, 0xff, 0x01]);
    }

    #[test]
    fn json_survives_msgpack_and_back() {
        let v = json!(["a", [], {"k": null, "n": -3, "f": 0.5, "t": true}]);
        let mp = encode(&json_to_mp(&v)).unwrap();
        let back = decode_all(&mp).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(mp_to_json(&back[0]), v);
    }

    #[test]
    fn non_json_values_are_rendered() {
        let v = Value::Map(vec![
            (Value::from(1), Value::Binary(vec![0xde, 0xad])),
            (Value::from("e"), Value::Ext(5, vec![0x01])),
        ]);
        assert_eq!(
            mp_to_json(&v),
            json!({"1": "dead", "e": {"ext": 5, "data": "01"}})
        );
    }

    #[test]
    fn decode_all_reports_truncation() {
        assert_eq!(decode_all(&[0x01, 0x02]).unwrap().len(), 2);
        let err = decode_all(&[0x01, 0xcd, 0x01]).unwrap_err();
        assert!(format!("{err:#}").contains("at byte 1"), "{err:#}");
    }
}
