// src/templates.rs

//! Starter code shown in the editor when a learner picks a language/problem.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Problem {
    #[default]
    Blank,
    TwoSum,
}

impl Problem {
    /// Statement pre-filled next to the template.
    pub fn statement(self) -> &'static str {
        match self {
            Problem::Blank => "",
            Problem::TwoSum => {
                "Given an array of integers nums and an integer target, return indices of \
                 the two numbers such that they add up to target."
            }
        }
    }
}

impl FromStr for Problem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "blank" | "basic" | "" => Ok(Problem::Blank),
            "two-sum" | "twosum" => Ok(Problem::TwoSum),
            other => anyhow::bail!("Unknown problem template: {}", other),
        }
    }
}

pub fn template(language: Language, problem: Problem) -> &'static str {
    match (problem, language) {
        (Problem::Blank, Language::Python) => BLANK_PYTHON,
        (Problem::Blank, Language::Java) => BLANK_JAVA,
        (Problem::Blank, Language::JavaScript) => BLANK_JAVASCRIPT,
        (Problem::TwoSum, Language::Python) => TWO_SUM_PYTHON,
        (Problem::TwoSum, Language::Java) => TWO_SUM_JAVA,
        (Problem::TwoSum, Language::JavaScript) => TWO_SUM_JAVASCRIPT,
    }
}

const BLANK_PYTHON: &str = r#"def main():
    # Write your code here
    pass

if __name__ == "__main__":
    main()"#;

const BLANK_JAVA: &str = r#"public class Solution {
    public static void main(String[] args) {
        // Write your code here

    }
}"#;

const BLANK_JAVASCRIPT: &str = r#"function main() {
    // Write your code here

}

main();"#;

const TWO_SUM_PYTHON: &str = r#"def two_sum(nums, target):
    # Given an array of integers nums and an integer target,
    # return indices of the two numbers such that they add up to target.
    pass

# Test the function
nums = [2, 7, 11, 15]
target = 9
result = two_sum(nums, target)
print(f"Indices: {result}")"#;

const TWO_SUM_JAVA: &str = r#"import java.util.*;

public class Solution {
    public int[] twoSum(int[] nums, int target) {
        // Given an array of integers nums and an integer target,
        // return indices of the two numbers such that they add up to target.
        return new int[]{};
    }

    public static void main(String[] args) {
        Solution solution = new Solution();
        int[] nums = {2, 7, 11, 15};
        int target = 9;
        int[] result = solution.twoSum(nums, target);
        System.out.println("Indices: " + Arrays.toString(result));
    }
}"#;

const TWO_SUM_JAVASCRIPT: &str = r#"function twoSum(nums, target) {
    // Given an array of integers nums and an integer target,
    // return indices of the two numbers such that they add up to target.

}

// Test the function
const nums = [2, 7, 11, 15];
const target = 9;
const result = twoSum(nums, target);
console.log("Indices:", result);"#;
