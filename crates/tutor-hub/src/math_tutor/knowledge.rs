//! Static high-school math knowledge base: domain → section → concepts.

use std::collections::BTreeMap;

use super::types::{ConceptMatch, MathDomain};
use crate::utils::TextUtils;

type Sections = &'static [(&'static str, &'static [&'static str])];

const NUMBERS_OPERATIONS: Sections = &[
    ("數系", &["實數與數線", "絕對值", "指數與根式", "科學記號"]),
    ("數列與級數", &["等差數列", "等比數列", "遞迴數列", "數學歸納法"]),
    ("不等式", &["算幾不等式", "柯西不等式", "絕對不等式"]),
];

const ALGEBRA_FUNCTIONS: Sections = &[
    ("多項式", &["多項式除法", "餘式定理", "因式定理", "因式分解"]),
    ("方程式", &["一元二次方程式", "判別式", "根與係數關係", "聯立方程式"]),
    ("函數", &["一次函數", "二次函數", "指數函數", "對數函數", "函數圖形平移"]),
];

const GEOMETRY_VECTORS: Sections = &[
    ("平面幾何", &["相似三角形", "畢氏定理", "圓的性質"]),
    ("坐標幾何", &["直線方程式", "圓方程式", "圓錐曲線"]),
    ("向量", &["向量加減與係數積", "內積", "向量投影", "空間向量"]),
];

const TRIGONOMETRY: Sections = &[
    ("三角比", &["銳角三角比", "廣義角", "弧度"]),
    ("三角函數", &["正弦函數圖形", "週期與振幅", "和角公式", "倍角公式"]),
    ("三角形解法", &["正弦定理", "餘弦定理", "三角形面積公式"]),
];

const CALCULUS: Sections = &[
    ("極限", &["數列極限", "函數極限", "連續性"]),
    ("微分", &["導數定義", "微分公式", "切線方程式", "極值與反曲點"]),
    ("積分", &["不定積分", "定積分", "微積分基本定理", "面積計算"]),
];

const STATISTICS_PROBABILITY: Sections = &[
    ("統計", &["平均數與中位數", "標準差", "相關係數", "迴歸直線"]),
    ("排列組合", &["乘法原理", "排列", "組合", "二項式定理"]),
    ("機率", &["古典機率", "條件機率", "獨立事件", "期望值", "二項分布"]),
];

const LINEAR_ALGEBRA: Sections = &[
    ("矩陣", &["矩陣運算", "反方陣", "行列式"]),
    ("線性方程組", &["高斯消去法", "克拉瑪公式"]),
    ("線性變換", &["旋轉矩陣", "鏡射矩陣", "伸縮變換"]),
];

pub fn sections(domain: MathDomain) -> Sections {
    match domain {
        MathDomain::NumbersOperations => NUMBERS_OPERATIONS,
        MathDomain::AlgebraFunctions => ALGEBRA_FUNCTIONS,
        MathDomain::GeometryVectors => GEOMETRY_VECTORS,
        MathDomain::Trigonometry => TRIGONOMETRY,
        MathDomain::Calculus => CALCULUS,
        MathDomain::StatisticsProbability => STATISTICS_PROBABILITY,
        MathDomain::LinearAlgebra => LINEAR_ALGEBRA,
    }
}

/// Each domain's concepts as `section: concept`, keyed by the domain's wire name.
pub fn available_concepts() -> BTreeMap<&'static str, Vec<String>> {
    MathDomain::ALL
        .into_iter()
        .map(|domain| {
            let concepts = sections(domain)
                .iter()
                .flat_map(|(section, concepts)| concepts.iter().map(move |c| format!("{}: {}", section, c)))
                .collect();
            (domain.as_str(), concepts)
        })
        .collect()
}

/// Concepts whose name contains `keyword`, ignoring case, within `domain` or everywhere.
pub fn matching(keyword: &str, domain: Option<MathDomain>) -> Vec<ConceptMatch> {
    let domains: Vec<MathDomain> = match domain {
        Some(domain) => vec![domain],
        None => MathDomain::ALL.to_vec(),
    };
    let mut found = Vec::new();
    for domain in domains {
        for &(section, concepts) in sections(domain) {
            for &concept in concepts {
                if TextUtils::contains_ignore_case(concept, keyword) {
                    found.push(ConceptMatch { domain: domain.as_str(), section, concept });
                }
            }
        }
    }
    found
}

/// Knowledge-base lines about `name` for a concept prompt.
pub fn concept_context(name: &str, domain: Option<MathDomain>) -> String {
    let lines: Vec<String> = matching(name, domain)
        .into_iter()
        .map(|m| format!("{} - {}: {}", m.domain, m.section, m.concept))
        .collect();
    if lines.is_empty() {
        "未找到相關概念資訊".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_has_concepts() {
        let all = available_concepts();
        assert_eq!(all.len(), MathDomain::ALL.len());
        assert!(all.values().all(|concepts| !concepts.is_empty()));
        assert!(all["代數與函數"].contains(&"方程式: 判別式".to_string()));
    }

    #[test]
    fn test_matching_is_substring_and_scoped() {
        let hits = matching("函數", None);
        assert!(hits.iter().any(|m| m.domain == "三角學" && m.concept == "正弦函數圖形"));
        assert!(hits.iter().any(|m| m.concept == "二次函數"));

        let scoped = matching("函數", Some(MathDomain::Trigonometry));
        assert!(scoped.iter().all(|m| m.domain == "三角學"));
        assert!(matching("不存在的概念", None).is_empty());
    }

    #[test]
    fn test_concept_context_falls_back_when_unknown() {
        assert!(concept_context("內積", None).contains("幾何與向量 - 向量: 內積"));
        assert_eq!(concept_context("quaternion", None), "未找到相關概念資訊");
    }
}
