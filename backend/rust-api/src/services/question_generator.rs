//! Procedural arithmetic question generation.
//!
//! Every question carries the exact integer answer of the expression it
//! renders. Division questions are built backwards from the quotient so they
//! never leave a remainder, and subtraction always puts the larger operand
//! first.

use rand::{seq::IndexedRandom, Rng};

use crate::models::{quiz::Question, Level, Operation};

/// Operators available inside extreme-level expressions.
const EXTREME_OPERATORS: [ArithOp; 4] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "×",
            ArithOp::Div => "÷",
        }
    }

    /// Applies the operator with truncating integer division.
    /// Returns `None` for a zero divisor.
    pub fn apply(&self, a: i64, b: i64) -> Option<i64> {
        match self {
            ArithOp::Add => Some(a + b),
            ArithOp::Sub => Some(a - b),
            ArithOp::Mul => Some(a * b),
            ArithOp::Div => a.checked_div(b),
        }
    }
}

/// Operand ranges for one non-extreme level.
#[derive(Debug, Clone, Copy)]
struct Tier {
    low: i64,
    high: i64,
    /// Range for the second factor of products and for divisors.
    secondary_low: i64,
    secondary_high: i64,
}

fn tier_for(level: Level) -> Tier {
    match level {
        Level::Easy => Tier {
            low: 1,
            high: 9,
            secondary_low: 1,
            secondary_high: 9,
        },
        Level::Medium => Tier {
            low: 10,
            high: 99,
            secondary_low: 1,
            secondary_high: 9,
        },
        // Extreme never reaches a tier; it shares hard's ranges if asked.
        Level::Hard | Level::Extreme => Tier {
            low: 100,
            high: 999,
            secondary_low: 10,
            secondary_high: 99,
        },
    }
}

/// Generates `count` questions using the thread-local RNG.
pub fn generate_quiz_questions(operation: Operation, level: Level, count: usize) -> Vec<Question> {
    let mut rng = rand::rng();
    generate_questions(&mut rng, operation, level, count)
}

/// Generates `count` questions in generation order.
pub fn generate_questions<R: Rng>(
    rng: &mut R,
    operation: Operation,
    level: Level,
    count: usize,
) -> Vec<Question> {
    (0..count)
        .map(|_| generate_single_question(rng, operation, level))
        .collect()
}

pub fn generate_single_question<R: Rng>(
    rng: &mut R,
    operation: Operation,
    level: Level,
) -> Question {
    if level == Level::Extreme {
        return generate_extreme_question(rng);
    }

    let operation = match operation {
        Operation::Mixed => *Operation::BASIC
            .choose(rng)
            .unwrap_or(&Operation::Addition),
        other => other,
    };

    generate_tiered_question(rng, operation, level)
}

fn generate_tiered_question<R: Rng>(
    rng: &mut R,
    operation: Operation,
    level: Level,
) -> Question {
    let tier = tier_for(level);
    let a = rng.random_range(tier.low..=tier.high);
    let b = rng.random_range(tier.low..=tier.high);

    let (question_text, answer) = match operation {
        Operation::Subtraction => {
            let (larger, smaller) = (a.max(b), a.min(b));
            (
                format!("{} {} {}", larger, ArithOp::Sub.symbol(), smaller),
                larger - smaller,
            )
        }
        Operation::Multiplication => {
            let factor = secondary_operand(rng, level, tier, b);
            (
                format!("{} {} {}", a, ArithOp::Mul.symbol(), factor),
                a * factor,
            )
        }
        Operation::Division => {
            let divisor = secondary_operand(rng, level, tier, b);
            let dividend = a * divisor;
            (
                format!("{} {} {}", dividend, ArithOp::Div.symbol(), divisor),
                a,
            )
        }
        // Mixed is resolved by the caller; treat anything else as addition.
        Operation::Addition | Operation::Mixed => {
            (format!("{} {} {}", a, ArithOp::Add.symbol(), b), a + b)
        }
    };

    Question {
        question_text,
        answer,
        operation,
        level,
    }
}

/// Easy reuses the second drawn operand; higher tiers draw a fresh smaller one.
fn secondary_operand<R: Rng>(rng: &mut R, level: Level, tier: Tier, drawn: i64) -> i64 {
    if level == Level::Easy {
        drawn
    } else {
        rng.random_range(tier.secondary_low..=tier.secondary_high)
    }
}

/// Builds `(a op1 b) op2 (c op3 d)` with a,b in 1..=20 and c,d in 1..=10.
///
/// Only the two parenthesised groups fix the evaluation order. Candidates
/// whose outer division would divide by zero are redrawn.
fn generate_extreme_question<R: Rng>(rng: &mut R) -> Question {
    loop {
        let a = rng.random_range(1..=20);
        let b = rng.random_range(1..=20);
        let c = rng.random_range(1..=10);
        let d = rng.random_range(1..=10);

        let op1 = pick_operator(rng);
        let op2 = pick_operator(rng);
        let op3 = pick_operator(rng);

        let answer = op1
            .apply(a, b)
            .zip(op3.apply(c, d))
            .and_then(|(left, right)| op2.apply(left, right));

        let Some(answer) = answer else {
            tracing::trace!("Discarding extreme expression with zero divisor");
            continue;
        };

        return Question {
            question_text: format!(
                "({} {} {}) {} ({} {} {})",
                a,
                op1.symbol(),
                b,
                op2.symbol(),
                c,
                op3.symbol(),
                d
            ),
            answer,
            operation: Operation::Mixed,
            level: Level::Extreme,
        };
    }
}

fn pick_operator<R: Rng>(rng: &mut R) -> ArithOp {
    *EXTREME_OPERATORS.choose(rng).unwrap_or(&ArithOp::Add)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn parse_op(symbol: &str) -> ArithOp {
        match symbol {
            "+" => ArithOp::Add,
            "-" => ArithOp::Sub,
            "×" => ArithOp::Mul,
            "÷" => ArithOp::Div,
            other => panic!("unexpected operator {}", other),
        }
    }

    /// Evaluates "a op b" or "(a op b) op (c op d)" as rendered.
    fn evaluate(text: &str) -> i64 {
        let tokens: Vec<&str> = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c| c == '(' || c == ')'))
            .collect();

        match tokens.as_slice() {
            [a, op, b] => parse_op(op)
                .apply(a.parse().unwrap(), b.parse().unwrap())
                .unwrap(),
            [a, op1, b, op2, c, op3, d] => {
                let left = parse_op(op1)
                    .apply(a.parse().unwrap(), b.parse().unwrap())
                    .unwrap();
                let right = parse_op(op3)
                    .apply(c.parse().unwrap(), d.parse().unwrap())
                    .unwrap();
                parse_op(op2).apply(left, right).unwrap()
            }
            _ => panic!("unexpected expression {}", text),
        }
    }

    fn operands(text: &str) -> (i64, i64) {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        (tokens[0].parse().unwrap(), tokens[2].parse().unwrap())
    }

    #[test]
    fn answers_match_rendered_expressions() {
        let mut rng = StdRng::seed_from_u64(7);
        for level in Level::ALL {
            for operation in Operation::ALL {
                for question in generate_questions(&mut rng, operation, level, 200) {
                    assert_eq!(
                        evaluate(&question.question_text),
                        question.answer,
                        "{:?}",
                        question
                    );
                }
            }
        }
    }

    #[test]
    fn generates_requested_count_in_order() {
        let mut rng = StdRng::seed_from_u64(1);
        let questions = generate_questions(&mut rng, Operation::Addition, Level::Easy, 10);
        assert_eq!(questions.len(), 10);
        assert!(questions.iter().all(|q| q.level == Level::Easy));
        assert!(questions.iter().all(|q| q.operation == Operation::Addition));
    }

    #[test]
    fn subtraction_never_goes_negative() {
        let mut rng = StdRng::seed_from_u64(11);
        for level in [Level::Easy, Level::Medium, Level::Hard] {
            for question in generate_questions(&mut rng, Operation::Subtraction, level, 500) {
                let (minuend, subtrahend) = operands(&question.question_text);
                assert!(minuend >= subtrahend);
                assert!(question.answer >= 0);
            }
        }
    }

    #[test]
    fn division_is_exact() {
        let mut rng = StdRng::seed_from_u64(3);
        for level in [Level::Easy, Level::Medium, Level::Hard] {
            for question in generate_questions(&mut rng, Operation::Division, level, 500) {
                let (dividend, divisor) = operands(&question.question_text);
                assert!(divisor >= 1);
                assert_eq!(dividend % divisor, 0);
                assert_eq!(dividend / divisor, question.answer);
            }
        }
    }

    #[test]
    fn operands_respect_level_ranges() {
        let mut rng = StdRng::seed_from_u64(5);

        for q in generate_questions(&mut rng, Operation::Addition, Level::Easy, 300) {
            let (a, b) = operands(&q.question_text);
            assert!((1..=9).contains(&a) && (1..=9).contains(&b));
        }
        for q in generate_questions(&mut rng, Operation::Addition, Level::Medium, 300) {
            let (a, b) = operands(&q.question_text);
            assert!((10..=99).contains(&a) && (10..=99).contains(&b));
        }
        for q in generate_questions(&mut rng, Operation::Multiplication, Level::Medium, 300) {
            let (a, b) = operands(&q.question_text);
            assert!((10..=99).contains(&a) && (1..=9).contains(&b));
        }
        for q in generate_questions(&mut rng, Operation::Multiplication, Level::Hard, 300) {
            let (a, b) = operands(&q.question_text);
            assert!((100..=999).contains(&a) && (10..=99).contains(&b));
        }
        for q in generate_questions(&mut rng, Operation::Division, Level::Hard, 300) {
            let (_, divisor) = operands(&q.question_text);
            assert!((10..=99).contains(&divisor));
            assert!((100..=999).contains(&q.answer));
        }
    }

    #[test]
    fn mixed_records_concrete_operation_below_extreme() {
        let mut rng = StdRng::seed_from_u64(9);
        let questions = generate_questions(&mut rng, Operation::Mixed, Level::Medium, 400);

        assert!(questions.iter().all(|q| q.operation != Operation::Mixed));
        for operation in Operation::BASIC {
            assert!(
                questions.iter().any(|q| q.operation == operation),
                "{:?} never drawn",
                operation
            );
        }
    }

    #[test]
    fn extreme_ignores_requested_operation() {
        let mut rng = StdRng::seed_from_u64(13);
        for operation in Operation::ALL {
            for q in generate_questions(&mut rng, operation, Level::Extreme, 100) {
                assert_eq!(q.operation, Operation::Mixed);
                assert_eq!(q.level, Level::Extreme);
                assert!(q.question_text.starts_with('('));

                let tokens: Vec<i64> = q
                    .question_text
                    .split_whitespace()
                    .filter_map(|t| t.trim_matches(|c| c == '(' || c == ')').parse().ok())
                    .collect();
                assert_eq!(tokens.len(), 4);
                assert!((1..=20).contains(&tokens[0]) && (1..=20).contains(&tokens[1]));
                assert!((1..=10).contains(&tokens[2]) && (1..=10).contains(&tokens[3]));
            }
        }
    }

    #[test]
    fn truncating_division_and_zero_divisor() {
        assert_eq!(ArithOp::Div.apply(7, 2), Some(3));
        assert_eq!(ArithOp::Div.apply(-7, 2), Some(-3));
        assert_eq!(ArithOp::Div.apply(3, 0), None);
    }
}
